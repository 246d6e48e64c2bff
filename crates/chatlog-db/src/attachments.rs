use std::path::Path;

/// A stored attachment path after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
    /// True unless `path` is an existing regular file. Directories count as
    /// missing.
    pub missing: bool,
}

/// Expands `~` and makes the stored path absolute, then checks the file.
pub fn resolve(stored: &str) -> ResolvedPath {
    if stored.trim().is_empty() {
        return ResolvedPath {
            path: String::new(),
            missing: true,
        };
    }

    let expanded = shellexpand::tilde(stored).into_owned();
    let path = std::path::absolute(Path::new(&expanded))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or(expanded);

    let missing = !std::fs::metadata(&path).is_ok_and(|meta| meta.is_file());
    ResolvedPath { path, missing }
}

/// Name to show for an attachment: transfer name, then filename.
pub fn display_name<'a>(filename: &'a str, transfer_name: &'a str) -> &'a str {
    if !transfer_name.is_empty() {
        transfer_name
    } else if !filename.is_empty() {
        filename
    } else {
        "(unknown)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_file_is_present() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "hi").unwrap();

        let resolved = resolve(file.to_str().unwrap());
        assert!(!resolved.missing);
        assert!(resolved.path.ends_with("test.txt"));
    }

    #[test]
    fn missing_file_and_directory_are_missing() {
        let dir = tempfile::tempdir().unwrap();

        let missing = resolve(dir.path().join("missing.txt").to_str().unwrap());
        assert!(missing.missing);

        let directory = resolve(dir.path().to_str().unwrap());
        assert!(directory.missing);

        assert!(resolve("").missing);
    }

    #[test]
    fn tilde_expands_to_absolute_path() {
        let resolved = resolve("~/Library/Messages/Attachments/test.dat");
        assert!(!resolved.path.starts_with('~'));
        assert!(Path::new(&resolved.path).is_absolute());
        assert!(resolved.path.ends_with("Library/Messages/Attachments/test.dat"));
    }

    #[test]
    fn display_name_prefers_transfer_name() {
        assert_eq!(display_name("file.dat", "nice.dat"), "nice.dat");
        assert_eq!(display_name("file.dat", ""), "file.dat");
        assert_eq!(display_name("", ""), "(unknown)");
    }
}
