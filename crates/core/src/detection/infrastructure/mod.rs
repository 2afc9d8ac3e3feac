pub mod model_resolver;
pub mod onnx_detector_loader;
pub mod onnx_yolo_detector;
