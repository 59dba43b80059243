use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdjustError {
    #[error("Source image is not loaded yet")]
    NotReady,

    #[error("Failed to load image '{path}': {message}")]
    ImageLoadError { path: PathBuf, message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Image decoding error: {message}")]
    DecodingError { message: String },

    #[error("Drawing surface unavailable: {message}")]
    SurfaceUnavailable { message: String },

    #[error("Pixel data is not accessible: {message}")]
    ExtractionDenied { message: String },

    #[error("Pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    InvalidBuffer { expected: usize, actual: usize },

    #[error("Background adjustment failed: {message}")]
    BackgroundFailure { message: String },

    #[error("GPU unavailable: {message}")]
    GpuUnavailable { message: String },

    #[error("Shader compilation failed: {message}")]
    ShaderCompile { message: String },

    #[error("GPU processing error: {message}")]
    GpuError { message: String },

    #[error("Encoding to {mime} failed: {message}")]
    EncodeError { mime: String, message: String },

    #[error("Unsupported output format: {mime}")]
    UnsupportedFormat { mime: String },

    #[error("Unknown adjustment axis: {name}")]
    UnknownAxis { name: String },

    #[error("Unknown asset: {url}")]
    UnknownAsset { url: String },

    #[error("Settings error: {message}")]
    SettingsError { message: String },

    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, AdjustError>;

impl AdjustError {
    /// Returns true if the caller may retry the same operation later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AdjustError::NotReady
                | AdjustError::FileNotFound { .. }
                | AdjustError::BackgroundFailure { .. }
                | AdjustError::GpuError { .. }
                | AdjustError::IoError { .. }
        )
    }

    /// True for the errors that mean "show the unadjusted image instead"
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AdjustError::SurfaceUnavailable { .. }
                | AdjustError::ExtractionDenied { .. }
                | AdjustError::GpuUnavailable { .. }
                | AdjustError::ShaderCompile { .. }
        )
    }

    /// Returns a user-friendly error message with recovery suggestions
    pub fn user_message(&self) -> String {
        let base_message = self.to_string();
        let suggestion = match self {
            AdjustError::NotReady => "Wait for the image to finish loading and try again.",
            AdjustError::FileNotFound { .. } => "Check if the file exists and you have permission to access it.",
            AdjustError::ImageLoadError { .. } | AdjustError::DecodingError { .. } => "The image file may be corrupted. Try opening it in another viewer.",
            AdjustError::SurfaceUnavailable { .. } | AdjustError::ExtractionDenied { .. } => "Adjustments are unavailable for this image. The original is shown instead.",
            AdjustError::GpuUnavailable { .. } | AdjustError::ShaderCompile { .. } => "Live preview is unavailable on this device. Exported images are still adjusted on the CPU.",
            AdjustError::GpuError { .. } => "GPU processing failed. The operation will fall back to CPU processing, which may be slower.",
            AdjustError::BackgroundFailure { .. } => "Background processing failed. The adjustment was completed on the main thread.",
            AdjustError::EncodeError { .. } | AdjustError::UnsupportedFormat { .. } => "Try exporting as JPEG or PNG.",
            AdjustError::IoError { .. } => "File system error occurred. Check disk space and permissions.",
            _ => "An unexpected error occurred.",
        };

        format!("{}\n\n{}", base_message, suggestion)
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AdjustError::NotReady => "NOT_READY",
            AdjustError::ImageLoadError { .. } => "IMAGE_LOAD_ERROR",
            AdjustError::FileNotFound { .. } => "FILE_NOT_FOUND",
            AdjustError::DecodingError { .. } => "DECODING_ERROR",
            AdjustError::SurfaceUnavailable { .. } => "SURFACE_UNAVAILABLE",
            AdjustError::ExtractionDenied { .. } => "EXTRACTION_DENIED",
            AdjustError::InvalidBuffer { .. } => "INVALID_BUFFER",
            AdjustError::BackgroundFailure { .. } => "BACKGROUND_FAILURE",
            AdjustError::GpuUnavailable { .. } => "GPU_UNAVAILABLE",
            AdjustError::ShaderCompile { .. } => "SHADER_COMPILE",
            AdjustError::GpuError { .. } => "GPU_ERROR",
            AdjustError::EncodeError { .. } => "ENCODE_ERROR",
            AdjustError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            AdjustError::UnknownAxis { .. } => "UNKNOWN_AXIS",
            AdjustError::UnknownAsset { .. } => "UNKNOWN_ASSET",
            AdjustError::SettingsError { .. } => "SETTINGS_ERROR",
            AdjustError::IoError { .. } => "IO_ERROR",
            AdjustError::JsonError { .. } => "JSON_ERROR",
        }
    }

    /// Logs the error with its code
    pub fn log(&self) {
        if self.is_unavailable() {
            log::warn!("[{}] {}", self.error_code(), self);
        } else {
            log::error!("[{}] {}", self.error_code(), self);
        }
    }
}
