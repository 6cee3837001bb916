mod adapter;
#[cfg(feature = "onnx")]
mod onnx;

pub use adapter::{
    class_name, AdapterSettings, Detection, DetectionAdapter, DetectorBackend, RawDetection,
    COCO_CLASSES,
};

#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;
