//! Face auto-capture: decides when a webcam frame shows a single, centered,
//! well-sized face, counts down, takes exactly one snapshot and uploads it.

pub mod shared {
    pub mod constants;
    pub mod face_box;
    pub mod frame;
}

pub mod detection {
    pub mod domain {
        pub mod detector_loader;
        pub mod face_detector;
        pub mod face_landmarks;
    }
    pub mod infrastructure;
}

pub mod positioning {
    pub mod domain {
        pub mod position_evaluator;
    }
}

pub mod capture {
    pub mod domain {
        pub mod camera;
        pub mod capture_event;
        pub mod capture_pipeline;
        pub mod capture_policy;
        pub mod capture_state;
        pub mod snapshot_encoder;
    }
    pub mod infrastructure;
}

pub mod upload {
    pub mod domain {
        pub mod upload_adapter;
    }
    pub mod infrastructure;
}
