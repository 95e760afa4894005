use super::{
    ArtifactField, Constraint, DefaultValue, FileLabel, InputBinding, ModelSchema, OptionSpec,
    OutputLayout, Positional, Presence,
};

const OUTPUT_FORMATS: &[&str] = &["jpeg", "png", "webp"];
const IMAGE_SIZES: &[&str] = &[
    "square_hd",
    "square",
    "portrait_4_3",
    "portrait_16_9",
    "landscape_4_3",
    "landscape_16_9",
];
const SEED: Constraint = Constraint::IntegerRange {
    min: 0,
    max: u32::MAX as i64,
};

const fn opt(
    key: &'static str,
    flag: &'static str,
    help: &'static str,
    constraint: Constraint,
    presence: Presence,
) -> OptionSpec {
    OptionSpec {
        key,
        flag,
        help,
        constraint,
        presence,
    }
}

const PROMPT: OptionSpec = opt(
    "prompt",
    "prompt",
    "Text prompt.",
    Constraint::Text,
    Presence::Required,
);
const SAFETY: OptionSpec = opt(
    "enable_safety_checker",
    "no-safety",
    "Disable the safety checker.",
    Constraint::Flag,
    Presence::Default(DefaultValue::Flag(true)),
);

pub static QWEN_IMAGE: ModelSchema = ModelSchema {
    name: "t2i-qwen-image",
    model_id: "fal-ai/qwen-image-2512/lora",
    summary: "Text to image with Qwen Image 2512.",
    positionals: &[Positional::Option("prompt")],
    input: InputBinding::None,
    options: &[
        PROMPT,
        opt(
            "negative_prompt",
            "negative",
            "Negative prompt.",
            Constraint::Text,
            Presence::Default(DefaultValue::Text("")),
        ),
        opt(
            "image_size",
            "size",
            "Image size preset.",
            Constraint::Choice(IMAGE_SIZES),
            Presence::Default(DefaultValue::Text("landscape_4_3")),
        ),
        opt(
            "num_inference_steps",
            "steps",
            "Inference steps.",
            Constraint::IntegerRange { min: 1, max: 100 },
            Presence::Default(DefaultValue::Integer(28)),
        ),
        opt(
            "guidance_scale",
            "scale",
            "Guidance scale.",
            Constraint::FloatRange {
                min: 1.0,
                max: 20.0,
            },
            Presence::Default(DefaultValue::Float(4.0)),
        ),
        opt("seed", "seed", "Random seed.", SEED, Presence::Optional),
        opt(
            "num_images",
            "num",
            "Number of images to generate.",
            Constraint::IntegerRange { min: 1, max: 4 },
            Presence::Default(DefaultValue::Integer(1)),
        ),
        SAFETY,
        opt(
            "output_format",
            "format",
            "Output format.",
            Constraint::Choice(OUTPUT_FORMATS),
            Presence::Default(DefaultValue::Text("png")),
        ),
        opt(
            "acceleration",
            "acceleration",
            "Acceleration level.",
            Constraint::Choice(&["none", "regular", "high"]),
            Presence::Default(DefaultValue::Text("regular")),
        ),
    ],
    output: OutputLayout {
        artifacts: ArtifactField::List("images"),
        category: "images/generated",
        extension: "png",
        prefix: None,
        label: FileLabel::None,
        seed_in_name: true,
    },
};

pub static NANO_BANANA_PRO: ModelSchema = ModelSchema {
    name: "t2i-nano-banana-pro",
    model_id: "fal-ai/nano-banana-pro",
    summary: "Text to image with Nano Banana Pro, strong at rendering text.",
    positionals: &[Positional::Option("prompt")],
    input: InputBinding::None,
    options: &[
        PROMPT,
        opt(
            "negative_prompt",
            "negative",
            "Negative prompt.",
            Constraint::Text,
            Presence::Optional,
        ),
        opt(
            "aspect_ratio",
            "size",
            "Aspect ratio.",
            Constraint::Choice(&[
                "21:9", "16:9", "3:2", "4:3", "5:4", "1:1", "4:5", "3:4", "2:3", "9:16",
            ]),
            Presence::Default(DefaultValue::Text("1:1")),
        ),
        opt(
            "resolution",
            "resolution",
            "Output resolution.",
            Constraint::Choice(&["1K", "2K", "4K"]),
            Presence::Default(DefaultValue::Text("1K")),
        ),
        opt(
            "num_images",
            "num",
            "Number of images to generate.",
            Constraint::IntegerRange { min: 1, max: 10 },
            Presence::Default(DefaultValue::Integer(1)),
        ),
        opt(
            "output_format",
            "format",
            "Output format.",
            Constraint::Choice(OUTPUT_FORMATS),
            Presence::Default(DefaultValue::Text("png")),
        ),
        SAFETY,
        opt("seed", "seed", "Random seed.", SEED, Presence::Optional),
    ],
    output: OutputLayout {
        artifacts: ArtifactField::List("images"),
        category: "images/generated",
        extension: "png",
        prefix: Some("nano_banana"),
        label: FileLabel::None,
        seed_in_name: true,
    },
};

pub static QWEN_IMAGE_EDIT: ModelSchema = ModelSchema {
    name: "i2i-qwen-image-edit",
    model_id: "fal-ai/qwen-image-edit-2511",
    summary: "Edit an image from a text instruction with Qwen Image Edit 2511.",
    positionals: &[Positional::Input, Positional::Option("prompt")],
    input: InputBinding::List("image_urls"),
    options: &[
        PROMPT,
        opt(
            "negative_prompt",
            "negative",
            "Negative prompt.",
            Constraint::Text,
            Presence::Default(DefaultValue::Text("")),
        ),
        opt(
            "num_inference_steps",
            "steps",
            "Inference steps.",
            Constraint::IntegerRange { min: 1, max: 100 },
            Presence::Default(DefaultValue::Integer(28)),
        ),
        opt(
            "guidance_scale",
            "scale",
            "Guidance scale.",
            Constraint::FloatRange {
                min: 1.0,
                max: 20.0,
            },
            Presence::Default(DefaultValue::Float(4.5)),
        ),
        opt("seed", "seed", "Random seed.", SEED, Presence::Optional),
        SAFETY,
        opt(
            "output_format",
            "format",
            "Output format.",
            Constraint::Choice(OUTPUT_FORMATS),
            Presence::Default(DefaultValue::Text("png")),
        ),
    ],
    output: OutputLayout {
        artifacts: ArtifactField::List("images"),
        category: "images/edited",
        extension: "png",
        prefix: None,
        label: FileLabel::Fixed("edited"),
        seed_in_name: false,
    },
};

pub static LTX_2: ModelSchema = ModelSchema {
    name: "i2v-ltx-2",
    model_id: "fal-ai/ltx-2/image-to-video/fast",
    summary: "Image to video with LTX-2 fast.",
    positionals: &[Positional::Input],
    input: InputBinding::Single("image_url"),
    options: &[
        opt(
            "prompt",
            "prompt",
            "Motion prompt.",
            Constraint::Text,
            Presence::Default(DefaultValue::Text("")),
        ),
        opt(
            "duration",
            "duration",
            "Video length in seconds.",
            Constraint::IntegerChoice(&[6, 8, 10, 12, 14, 16, 18, 20]),
            Presence::Default(DefaultValue::Integer(6)),
        ),
        opt(
            "fps",
            "fps",
            "Frame rate.",
            Constraint::IntegerChoice(&[25, 50]),
            Presence::Default(DefaultValue::Integer(25)),
        ),
        opt(
            "motion_scale",
            "motion",
            "Motion scale.",
            Constraint::FloatRange {
                min: 0.0,
                max: 10.0,
            },
            Presence::Default(DefaultValue::Float(1.0)),
        ),
    ],
    output: OutputLayout {
        artifacts: ArtifactField::Single("video"),
        category: "videos/generated",
        extension: "mp4",
        prefix: None,
        label: FileLabel::Fixed("video"),
        seed_in_name: false,
    },
};

pub static LTX_2_AUDIO: ModelSchema = ModelSchema {
    name: "i2v-ltx-2-audio",
    model_id: "fal-ai/ltx-2-19b/distilled/image-to-video",
    summary: "Image to video with generated audio using LTX-2 19B distilled.",
    positionals: &[Positional::Input],
    input: InputBinding::Single("image_url"),
    options: &[
        opt(
            "prompt",
            "prompt",
            "Motion prompt.",
            Constraint::Text,
            Presence::Default(DefaultValue::Text(
                "Continue the scene naturally, maintaining the same style and motion.",
            )),
        ),
        opt(
            "num_frames",
            "frames",
            "Number of frames.",
            Constraint::IntegerRange { min: 9, max: 481 },
            Presence::Default(DefaultValue::Integer(121)),
        ),
        opt(
            "video_size",
            "size",
            "Video size preset.",
            Constraint::Choice(&[
                "auto",
                "square_hd",
                "square",
                "portrait_4_3",
                "portrait_16_9",
                "landscape_4_3",
                "landscape_16_9",
            ]),
            Presence::Default(DefaultValue::Text("auto")),
        ),
        opt(
            "generate_audio",
            "no-audio",
            "Do not generate audio.",
            Constraint::Flag,
            Presence::Default(DefaultValue::Flag(true)),
        ),
        opt(
            "use_multiscale",
            "no-multiscale",
            "Disable multiscale generation.",
            Constraint::Flag,
            Presence::Default(DefaultValue::Flag(true)),
        ),
        opt(
            "fps",
            "fps",
            "Frame rate.",
            Constraint::FloatRange {
                min: 1.0,
                max: 60.0,
            },
            Presence::Default(DefaultValue::Float(25.0)),
        ),
        opt(
            "acceleration",
            "acceleration",
            "Acceleration level.",
            Constraint::Choice(&["none", "regular", "high", "full"]),
            Presence::Optional,
        ),
        opt(
            "camera_lora",
            "camera",
            "Camera motion LoRA.",
            Constraint::Choice(&[
                "dolly_in",
                "dolly_out",
                "dolly_left",
                "dolly_right",
                "jib_up",
                "jib_down",
                "static",
                "none",
            ]),
            Presence::Optional,
        ),
        opt(
            "camera_lora_scale",
            "camera-scale",
            "Camera LoRA scale.",
            Constraint::FloatRange { min: 0.0, max: 2.0 },
            Presence::Optional,
        ),
        opt(
            "negative_prompt",
            "negative",
            "Negative prompt.",
            Constraint::Text,
            Presence::Optional,
        ),
        opt(
            "enable_prompt_expansion",
            "no-prompt-expansion",
            "Disable prompt expansion.",
            Constraint::Flag,
            Presence::Default(DefaultValue::Flag(true)),
        ),
        SAFETY,
        opt(
            "video_output_type",
            "output-type",
            "Container and codec.",
            Constraint::Choice(&[
                "X264 (.mp4)",
                "VP9 (.webm)",
                "PRORES4444 (.mov)",
                "GIF (.gif)",
            ]),
            Presence::Optional,
        ),
        opt(
            "video_quality",
            "quality",
            "Encoding quality.",
            Constraint::Choice(&["low", "medium", "high", "maximum"]),
            Presence::Optional,
        ),
        opt(
            "video_write_mode",
            "write-mode",
            "Encoder write mode.",
            Constraint::Choice(&["fast", "balanced", "small"]),
            Presence::Optional,
        ),
    ],
    output: OutputLayout {
        artifacts: ArtifactField::Single("video"),
        category: "videos/generated",
        extension: "mp4",
        prefix: None,
        label: FileLabel::WhenFlag {
            option: "generate_audio",
            when_set: "audio_video",
            otherwise: "video",
        },
        seed_in_name: false,
    },
};

pub static SCHEMAS: &[&ModelSchema] = &[
    &QWEN_IMAGE,
    &NANO_BANANA_PRO,
    &QWEN_IMAGE_EDIT,
    &LTX_2,
    &LTX_2_AUDIO,
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_and_flags_are_unique() {
        let names = SCHEMAS.iter().map(|s| s.name).collect::<HashSet<_>>();
        assert_eq!(names.len(), SCHEMAS.len());
        for schema in SCHEMAS {
            let flags = schema.options.iter().map(|o| o.flag).collect::<HashSet<_>>();
            let keys = schema.options.iter().map(|o| o.key).collect::<HashSet<_>>();
            assert_eq!(flags.len(), schema.options.len(), "{}", schema.name);
            assert_eq!(keys.len(), schema.options.len(), "{}", schema.name);
        }
    }

    #[test]
    fn positionals_refer_to_known_options() {
        for schema in SCHEMAS {
            for positional in schema.positionals {
                match positional {
                    Positional::Option(key) => assert!(schema.option(key).is_some()),
                    Positional::Input => assert_ne!(schema.input, InputBinding::None),
                }
            }
        }
    }

    #[test]
    fn label_flags_exist() {
        for schema in SCHEMAS {
            if let FileLabel::WhenFlag { option, .. } = schema.output.label {
                let spec = schema.option(option).unwrap();
                assert_eq!(spec.constraint, Constraint::Flag);
            }
        }
    }
}
