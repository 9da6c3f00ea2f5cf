//! Stage table
//!
//! Fixed checkpoints a build passes through before packaging. Progress
//! advances in discrete jumps at each boundary; 100 is reserved for
//! completion.

/// A named checkpoint in a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub progress: u8,
    pub message: &'static str,
}

pub const STAGES: &[Stage] = &[
    Stage {
        name: "verifying",
        progress: 10,
        message: "Verifying input files...",
    },
    Stage {
        name: "unpacking",
        progress: 20,
        message: "Unpacking APK...",
    },
    Stage {
        name: "optimizing",
        progress: 40,
        message: "Optimizing resources...",
    },
    Stage {
        name: "generating",
        progress: 60,
        message: "Generating AAB...",
    },
    Stage {
        name: "signing",
        progress: 80,
        message: "Signing bundle with keystore...",
    },
];

pub const START_MESSAGE: &str = "Starting AAB generation";
pub const SUCCESS_MESSAGE: &str = "AAB generated successfully!";
