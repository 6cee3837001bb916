mod motion;

pub use motion::{sensitivity_threshold, MotionAnalysis, MotionAnalyzer};
