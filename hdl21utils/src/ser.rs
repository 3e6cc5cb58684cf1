//!
//! # Serialization & Deserialization Utilities
//! (and file IO for those serialized objects)
//!

// Standard Lib Imports
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

// Crates.io Imports
use serde::de::DeserializeOwned;
use serde::Serialize;
use textwrap::dedent;

/// # Enumerated First-Class-Supported Serialization Formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationFormat {
    Json,
    Yaml,
    Toml,
}
impl SerializationFormat {
    /// Infer the format from the extension of file-path `fname`
    pub fn from_path(fname: impl AsRef<Path>) -> Result<Self, Error> {
        let fname = fname.as_ref();
        let ext = fname
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(Error::UnknownFormat(fname.display().to_string())),
        }
    }
    /// Convert any [serde::Serialize] data to a serialized string
    pub fn to_string(&self, data: &impl Serialize) -> Result<String, Error> {
        match *self {
            Self::Json => Ok(serde_json::to_string_pretty(data)?),
            Self::Yaml => Ok(serde_yaml::to_string(data)?),
            Self::Toml => Ok(toml::to_string(data)?),
        }
    }
    /// Parse string `s`.
    /// Common leading whitespace is removed first, so that indented literals parse.
    pub fn from_str<T: DeserializeOwned>(&self, s: &str) -> Result<T, Error> {
        let s = dedent(s);
        match *self {
            Self::Json => Ok(serde_json::from_str(&s)?),
            Self::Yaml => Ok(serde_yaml::from_str(&s)?),
            Self::Toml => Ok(toml::from_str(&s)?),
        }
    }
    /// Save `data` to file `fname`
    pub fn save(&self, data: &impl Serialize, fname: impl AsRef<Path>) -> Result<(), Error> {
        let mut file = BufWriter::new(std::fs::File::create(fname)?);
        let s = self.to_string(data)?;
        file.write_all(s.as_bytes())?;
        file.flush()?;
        Ok(())
    }
    /// Load from file at path `fname`
    pub fn open<T: DeserializeOwned>(&self, fname: impl AsRef<Path>) -> Result<T, Error> {
        let file = std::fs::File::open(&fname)?;
        let mut file = BufReader::new(file);
        let rv: T = match *self {
            Self::Json => serde_json::from_reader(file)?,
            Self::Yaml => serde_yaml::from_reader(file)?,
            Self::Toml => {
                // TOML doesn't have a reader method; read the whole thing into a string
                let mut s = String::new();
                file.read_to_string(&mut s)?;
                toml::from_str(&s)?
            }
        };
        Ok(rv)
    }
}

/// Serialization to & from file trait
///
/// Includes:
/// * `open` for loading from file
/// * `save` for saving to file
/// * `open_path` for loading with the format inferred from the file extension
///
/// Fully default-implemented, allowing empty implementations
/// for types that implement [serde] serialization and deserialization.
///
pub trait SerdeFile: Serialize + DeserializeOwned {
    /// Save in `fmt`-format to file `fname`
    fn save(&self, fmt: SerializationFormat, fname: impl AsRef<Path>) -> Result<(), Error> {
        fmt.save(self, fname)
    }
    /// Open from `fmt`-format file `fname`
    fn open(fname: impl AsRef<Path>, fmt: SerializationFormat) -> Result<Self, Error> {
        fmt.open(fname)
    }
    /// Open from file `fname`, inferring its format from its extension
    fn open_path(fname: impl AsRef<Path>) -> Result<Self, Error> {
        let fmt = SerializationFormat::from_path(&fname)?;
        fmt.open(fname)
    }
}

/// Serialization & File-IO Errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot infer serialization format of `{0}`")]
    UnknownFormat(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Conf {
        name: String,
        width: usize,
    }
    impl SerdeFile for Conf {}

    #[test]
    fn test_from_path() -> Result<(), Error> {
        assert_eq!(SerializationFormat::from_path("a/b.json")?, SerializationFormat::Json);
        assert_eq!(SerializationFormat::from_path("b.YML")?, SerializationFormat::Yaml);
        assert_eq!(SerializationFormat::from_path("c.toml")?, SerializationFormat::Toml);
        assert!(SerializationFormat::from_path("d.txt").is_err());
        assert!(SerializationFormat::from_path("noext").is_err());
        Ok(())
    }
    #[test]
    fn test_from_str() -> Result<(), Error> {
        let c: Conf = SerializationFormat::Toml.from_str(
            r#"
            name = "inv"
            width = 4
            "#,
        )?;
        assert_eq!(
            c,
            Conf {
                name: "inv".into(),
                width: 4
            }
        );
        Ok(())
    }
    #[test]
    fn test_save_open() -> Result<(), Error> {
        let c = Conf {
            name: "buf".into(),
            width: 2,
        };
        let fname = std::env::temp_dir().join("hdl21utils_test_save_open.yaml");
        c.save(SerializationFormat::Yaml, &fname)?;
        let back = Conf::open_path(&fname)?;
        assert_eq!(back, c);
        std::fs::remove_file(&fname)?;
        Ok(())
    }
}
