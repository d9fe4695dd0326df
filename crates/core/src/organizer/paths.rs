use std::path::{Path, PathBuf};

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Make one path component safe on every host filesystem.
/// Path separators are replaced too, so the result never adds nesting.
pub fn sanitize_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return format!("_{trimmed}");
    }
    trimmed.to_string()
}

/// Join sanitized directory components and a sanitized file name under `root`.
pub fn destination(root: &Path, dirs: &[String], file_name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for dir in dirs {
        path.push(sanitize_component(dir));
    }
    path.push(sanitize_component(file_name));
    path
}

/// Case-insensitive identity of a destination, so `A.bin` and `a.bin`
/// collide the way they would on case-insensitive filesystems.
pub fn conflict_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// `name_1.ext`, `name_2.ext`, ... next to the original path.
pub fn with_suffix(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    path.with_file_name(name)
}

/// Hidden sibling used while a write is in flight.
pub fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.partial"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_characters_replaced() {
        assert_eq!(sanitize_component("Zelda: A Link? <1>"), "Zelda_ A Link_ _1_");
        assert_eq!(sanitize_component("a/b\\c|d*e\"f"), "a_b_c_d_e_f");
    }

    #[test]
    fn test_trailing_dots_and_spaces_trimmed() {
        assert_eq!(sanitize_component("  Name. "), "Name");
        assert_eq!(sanitize_component("..."), "unnamed");
        assert_eq!(sanitize_component(""), "unnamed");
    }

    #[test]
    fn test_reserved_device_names() {
        assert_eq!(sanitize_component("CON"), "_CON");
        assert_eq!(sanitize_component("aux.bin"), "_aux.bin");
        assert_eq!(sanitize_component("Console"), "Console");
    }

    #[test]
    fn test_destination_cannot_escape_root() {
        let dest = destination(Path::new("/out"), &["../etc".to_string()], "x/../y.bin");
        assert_eq!(dest, PathBuf::from("/out/_etc/x_.._y.bin"));
    }

    #[test]
    fn test_suffix_and_partial() {
        assert_eq!(with_suffix(Path::new("/o/Game.nes"), 2), PathBuf::from("/o/Game_2.nes"));
        assert_eq!(with_suffix(Path::new("/o/README"), 1), PathBuf::from("/o/README_1"));
        assert_eq!(
            partial_path(Path::new("/o/Game.nes")),
            PathBuf::from("/o/.Game.nes.partial")
        );
    }
}
