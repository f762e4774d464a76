use std::fmt;

/// Every recoverable failure the collage core can report.
///
/// None of these are fatal: a failed decode leaves its layer absent, an
/// unmounted surface skips the render, and the previous frame stays on screen.
#[derive(Debug)]
pub enum CollageError {
    /// Image bytes could not be decoded (corrupt or unsupported format).
    Decode(String),
    /// Render requested before the drawing surface was mounted.
    SurfaceUnavailable,
    /// A color string that is not `#rgb` / `#rrggbb`.
    InvalidColor(String),
    /// PNG encoding of the finished frame failed.
    Encode(String),
    /// Font data could not be located or parsed.
    Font(String),
    Io(std::io::Error),
}

impl fmt::Display for CollageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollageError::Decode(e) => write!(f, "image decode failed: {}", e),
            CollageError::SurfaceUnavailable => write!(f, "drawing surface is not mounted"),
            CollageError::InvalidColor(s) => write!(f, "invalid color value '{}'", s),
            CollageError::Encode(e) => write!(f, "image encode failed: {}", e),
            CollageError::Font(e) => write!(f, "font unavailable: {}", e),
            CollageError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CollageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CollageError {
    fn from(e: std::io::Error) -> Self {
        CollageError::Io(e)
    }
}

impl From<image::ImageError> for CollageError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => CollageError::Io(io),
            image::ImageError::Encoding(enc) => CollageError::Encode(enc.to_string()),
            other => CollageError::Decode(other.to_string()),
        }
    }
}
