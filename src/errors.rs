use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No images available: {0}")]
    NoImages(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Screen capture error: {0}")]
    Capture(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Tesseract OCR not found! The executable should be at {0}")]
    OcrEngineMissing(String),

    #[error("Fail-safe triggered: pointer parked at {0}")]
    FailSafe(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),
}

pub type MarketResult<T> = Result<T, MarketError>;
