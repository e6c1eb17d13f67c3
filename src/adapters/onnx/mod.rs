pub mod model_source;
pub mod postprocess;
pub mod yolo_engine;
