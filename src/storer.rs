use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::Error;

pub trait FileStorer {
    fn write(&self, bytes: Bytes) -> Result<String, Error>;
    fn read(&self, fetch_code: &str) -> Result<Bytes, Error>;
}

/// Stores uploaded resumes on local disk under their content hash. The hash
/// doubles as the opaque fetch code recorded on the application.
pub struct LocalStorer {
    path: String,
}

impl LocalStorer {
    pub fn new(path: &str) -> Self {
        Self { path: path.to_owned() }
    }
}

impl FileStorer for LocalStorer {
    fn write(&self, bytes: Bytes) -> Result<String, Error> {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let name = format!("{:x}", hasher.finalize());
        let mut file = File::create(Path::new(&self.path).join(&name))?;
        file.write_all(&bytes)?;
        Ok(name)
    }

    fn read(&self, fetch_code: &str) -> Result<Bytes, Error> {
        // fetch codes are hex digests, anything path-like is bogus
        if fetch_code.contains('/') || fetch_code.contains('\\') || fetch_code.contains("..") {
            return Err(Error::NotFound("no stored file under that code".into()));
        }
        let mut file = File::open(Path::new(&self.path).join(fetch_code)).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound("no stored file under that code".into())
            } else {
                Error::Io(e)
            }
        })?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(Bytes::from(content))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn storer() -> LocalStorer {
        let dir = std::env::temp_dir().join("jobdesk-storer-test");
        std::fs::create_dir_all(&dir).unwrap();
        LocalStorer::new(dir.to_str().unwrap())
    }

    #[test]
    fn write_then_read_roundtrip() {
        let storer = storer();
        let code = storer.write(Bytes::from_static(b"resume body")).unwrap();
        let back = storer.read(&code).unwrap();
        assert_eq!(back, Bytes::from_static(b"resume body"));
    }

    #[test]
    fn unknown_code_is_not_found() {
        let storer = storer();
        assert!(matches!(storer.read("0f0f0f"), Err(Error::NotFound(_))));
    }

    #[test]
    fn path_like_code_is_not_found() {
        let storer = storer();
        assert!(matches!(storer.read("../etc/passwd"), Err(Error::NotFound(_))));
    }
}
