pub mod detection_state;
pub mod frame;
pub mod frame_analyzer;
pub mod frame_region;
pub mod mask;
pub mod pixel;
pub mod recorder;
pub mod region_detector;
pub mod threshold;
