//! Program images: the immutable initial memory a VM is built from.
//!
//! The text form is a single line of comma-separated base-10 integers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("program image is empty")]
    Empty,
    #[error("invalid integer {token:?} at position {index}")]
    InvalidInteger { index: usize, token: String },
}

/// An immutable program image.
///
/// Cloning is cheap; every [`Vm`](crate::Vm) built from it copies the words
/// into its own memory, so VMs never observe each other's writes.
#[derive(Clone, PartialEq, Eq)]
pub struct Program {
    words: Arc<[i64]>,
}

impl Program {
    pub fn new(words: impl Into<Arc<[i64]>>) -> Self {
        Self {
            words: words.into(),
        }
    }

    /// Parse the comma-separated text form.
    pub fn parse(text: &str) -> Result<Self, ImageError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ImageError::Empty);
        }
        let words = text
            .split(',')
            .enumerate()
            .map(|(index, token)| {
                let token = token.trim();
                token.parse::<i64>().map_err(|_| ImageError::InvalidInteger {
                    index,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(words))
    }

    /// Read and parse an image file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn words(&self) -> &[i64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl FromStr for Program {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Vec<i64>> for Program {
    fn from(words: Vec<i64>) -> Self {
        Self::new(words)
    }
}

impl From<&[i64]> for Program {
    fn from(words: &[i64]) -> Self {
        Self::new(words)
    }
}

impl AsRef<[i64]> for Program {
    fn as_ref(&self) -> &[i64] {
        &self.words
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("len", &self.words.len())
            .finish()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", word)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_line() {
        let program = Program::parse("1,9,10,3,2,3,11,0,99,30,40,50\n").unwrap();
        assert_eq!(program.len(), 12);
        assert_eq!(program.words()[0], 1);
        assert_eq!(program.words()[11], 50);
    }

    #[test]
    fn parse_negative_and_spaced() {
        let program: Program = " 109, -1 ,204,1,99 ".parse().unwrap();
        assert_eq!(program.words(), &[109, -1, 204, 1, 99]);
    }

    #[test]
    fn parse_large_words() {
        let program = Program::parse("104,1125899906842624,99").unwrap();
        assert_eq!(program.words()[1], 1_125_899_906_842_624);
    }

    #[test]
    fn parse_empty_is_error() {
        assert!(matches!(Program::parse("  \n"), Err(ImageError::Empty)));
    }

    #[test]
    fn parse_reports_bad_token() {
        match Program::parse("1,2,x,4") {
            Err(ImageError::InvalidInteger { index, token }) => {
                assert_eq!(index, 2);
                assert_eq!(token, "x");
            }
            other => panic!("expected InvalidInteger, got {:?}", other),
        }
    }

    #[test]
    fn trailing_comma_is_error() {
        assert!(matches!(
            Program::parse("1,2,"),
            Err(ImageError::InvalidInteger { index: 2, .. })
        ));
    }

    #[test]
    fn display_round_trips_text_form() {
        let program = Program::parse("3,0,4,0,99").unwrap();
        assert_eq!(program.to_string(), "3,0,4,0,99");
    }

    #[test]
    fn load_missing_file() {
        let err = Program::load("/nonexistent/intcode/image.txt").unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn load_from_disk() {
        let path = std::env::temp_dir().join(format!("intcode-image-{}.txt", std::process::id()));
        std::fs::write(&path, "1002,4,3,4,33\n").unwrap();
        let program = Program::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(program.words(), &[1002, 4, 3, 4, 33]);
    }
}
