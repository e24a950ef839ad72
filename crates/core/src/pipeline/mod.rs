pub mod observation_extractor;
pub mod pipeline_logger;
pub mod process_class_video_use_case;
