use std::{
    error::Error as StdError,
    fmt::{self, Display},
    io,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    UnsupportedTarget(String),
    StructuralCorruption(String),
    DecodingMismatch(String),
    Cancelled,
}

impl Error {
    pub fn structural_corruption(index_name: &str, block: u32, offset: Option<usize>, detail: &str) -> Self {
        let loc = match offset {
            Some(off) => format!("(block {}, offset {})", block, off),
            None => format!("(block {})", block),
        };
        Error::StructuralCorruption(format!(
            "index \"{}\" is corrupted: {} at {}",
            index_name, detail, loc
        ))
    }

    pub fn decoding_mismatch(index_name: &str, block: u32, detail: &str) -> Self {
        Error::DecodingMismatch(format!(
            "index \"{}\": decoding mismatch at block {}: {}",
            index_name, block, detail
        ))
    }
}

impl From<io::Error> for Error {
    fn from(ioe: io::Error) -> Self {
        Error::Io(ioe)
    }
}

impl StdError for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        use self::Error::*;

        match self {
            Io(e) => write!(f, "IO error: {}", e),
            UnsupportedTarget(e) => write!(f, "unsupported target: {}", e),
            StructuralCorruption(e) => write!(f, "{}", e),
            DecodingMismatch(e) => write!(f, "{}", e),
            Cancelled => write!(f, "index check cancelled"),
        }
    }
}
