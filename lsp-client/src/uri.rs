//! `file://` URI conversion.

use std::path::{Path, PathBuf};

use url::Url;

use crate::{LspError, Result};

pub fn path_to_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|()| LspError::BadPath(path.to_path_buf()))
}

pub fn uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri).map_err(|e| LspError::Protocol(format!("bad URI '{uri}': {e}")))?;
    url.to_file_path()
        .map_err(|()| LspError::Protocol(format!("URI '{uri}' is not a file path")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_paths() {
        let uri = path_to_uri(Path::new("/work/app/src/a.cpp")).unwrap();
        assert_eq!(uri, "file:///work/app/src/a.cpp");
        assert_eq!(uri_to_path(&uri).unwrap(), PathBuf::from("/work/app/src/a.cpp"));
    }

    #[test]
    fn escapes_spaces() {
        let uri = path_to_uri(Path::new("/work/my app/a.cpp")).unwrap();
        assert!(uri.contains("my%20app"));
        assert_eq!(uri_to_path(&uri).unwrap(), PathBuf::from("/work/my app/a.cpp"));
    }

    #[test]
    fn relative_paths_are_rejected() {
        assert!(path_to_uri(Path::new("relative/a.cpp")).is_err());
        assert!(uri_to_path("https://example.com/x").is_err());
    }
}
