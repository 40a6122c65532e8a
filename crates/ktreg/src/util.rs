use std::path::{Path, PathBuf};

/// Finds `name` in `start` or the nearest ancestor that has it.
pub fn find_upwards(start: &Path, name: &Path) -> Option<PathBuf> {
    let mut dir: Option<&Path> = Some(start);
    while let Some(d) = dir {
        let cand = d.join(name);
        if cand.is_file() {
            return Some(cand);
        }
        dir = d.parent();
    }
    None
}

pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join(path)
}

pub fn display_path<P: AsRef<Path>>(p: P) -> String {
    p.as_ref().display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_upwards_walks_to_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("a/ktreg.json"), "{}").unwrap();
        assert_eq!(
            find_upwards(&nested, Path::new("ktreg.json")),
            Some(dir.path().join("a/ktreg.json"))
        );
        assert_eq!(find_upwards(&nested, Path::new("nope.json")), None);
    }
}
