//! Staging: expand a master template set, copy the selected services, and
//! archive filled output.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// An expanded master template tree.
///
/// Directories are used in place; zip archives are unpacked into scratch
/// space that lives as long as this value.
pub enum Master {
    Dir(PathBuf),
    Unpacked(TempDir),
}

impl Master {
    /// Root of the expanded tree.
    pub fn path(&self) -> &Path {
        match self {
            Master::Dir(path) => path,
            Master::Unpacked(scratch) => scratch.path(),
        }
    }
}

/// Expand a master source into a readable directory tree.
///
/// Accepts a directory or a `.zip` archive; anything else is an error.
pub fn expand_master(source: &Path) -> Result<Master, Box<dyn std::error::Error>> {
    if source.is_dir() {
        return Ok(Master::Dir(source.to_path_buf()));
    }

    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension != "zip" {
        return Err(format!("master must be a folder or .zip: {}", source.display()).into());
    }

    let scratch = TempDir::new()?;
    let file = fs::File::open(source)?;
    let mut archive = ZipArchive::new(file)?;
    archive.extract(scratch.path())?;
    Ok(Master::Unpacked(scratch))
}

/// Split a comma-separated services list into trimmed selectors.
pub fn parse_services(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Copy the selected top-level entries of `master` into `dest`.
///
/// With a selection, a subdirectory is staged when its name contains any
/// selector (case-insensitive). Loose top-level files are staged only
/// when no selection is given. Returns the number of entries staged.
pub fn stage_selected(
    master: &Path,
    dest: &Path,
    services: Option<&[String]>,
) -> io::Result<usize> {
    fs::create_dir_all(dest)?;
    let wanted: Option<Vec<String>> =
        services.map(|list| list.iter().map(|s| s.to_lowercase()).collect());

    let mut entries: Vec<_> = fs::read_dir(master)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut staged = 0usize;
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        if path.is_dir() {
            if matches_selection(wanted.as_deref(), &name.to_string_lossy()) {
                copy_tree(&path, &dest.join(&name))?;
                staged += 1;
            }
        } else if wanted.is_none() {
            fs::copy(&path, dest.join(&name))?;
            staged += 1;
        }
    }
    Ok(staged)
}

fn matches_selection(wanted: Option<&[String]>, name: &str) -> bool {
    match wanted {
        None => true,
        Some(selectors) => {
            let lower = name.to_lowercase();
            selectors.iter().any(|s| lower.contains(s))
        }
    }
}

/// Archive the contents of `dir` into a zip at `dest`.
///
/// Entries are stored relative to `dir`, so unpacking reproduces the
/// directory contents without a wrapping folder. An existing archive at
/// `dest` is replaced.
pub fn zip_output(dir: &Path, dest: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = fs::File::create(dest)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    add_tree_entries(&mut writer, dir, Path::new(""), options)?;
    writer.finish()?;
    Ok(())
}

fn add_tree_entries(
    writer: &mut ZipWriter<fs::File>,
    dir: &Path,
    prefix: &Path,
    options: SimpleFileOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = prefix.join(entry.file_name());
        let name = relative.to_string_lossy().replace('\\', "/");
        if path.is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            add_tree_entries(writer, &path, &relative, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut source = fs::File::open(&path)?;
            io::copy(&mut source, writer)?;
        }
    }
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let target = dest.join(entry.file_name());
        if path.is_dir() {
            copy_tree(&path, &target)?;
        } else {
            fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"stub").unwrap();
    }

    #[test]
    fn test_stage_everything_without_selection() {
        let master = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        touch(&master.path().join("Residential Care/Policy.docx"));
        touch(&master.path().join("Community Access/Plan.docx"));
        touch(&master.path().join("Index.docx"));

        let staged = stage_selected(master.path(), dest.path(), None).unwrap();
        assert_eq!(staged, 3);
        assert!(dest.path().join("Residential Care/Policy.docx").exists());
        assert!(dest.path().join("Community Access/Plan.docx").exists());
        assert!(dest.path().join("Index.docx").exists());
    }

    #[test]
    fn test_selection_filters_directories_case_insensitively() {
        let master = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        touch(&master.path().join("Residential Care/Policy.docx"));
        touch(&master.path().join("Community Access/Plan.docx"));
        touch(&master.path().join("Index.docx"));

        let services = vec!["resident".to_string()];
        let staged = stage_selected(master.path(), dest.path(), Some(&services)).unwrap();
        assert_eq!(staged, 1);
        assert!(dest.path().join("Residential Care/Policy.docx").exists());
        assert!(!dest.path().join("Community Access").exists());
        // Loose files ride along only on an unfiltered copy.
        assert!(!dest.path().join("Index.docx").exists());
    }

    #[test]
    fn test_nested_directories_copied_whole() {
        let master = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        touch(&master.path().join("SIL/Forms/Intake.docx"));

        let services = vec!["sil".to_string()];
        stage_selected(master.path(), dest.path(), Some(&services)).unwrap();
        assert!(dest.path().join("SIL/Forms/Intake.docx").exists());
    }

    #[test]
    fn test_parse_services_trims_and_drops_empties() {
        assert_eq!(
            parse_services(" residential , sil,,"),
            vec!["residential".to_string(), "sil".to_string()]
        );
        assert!(parse_services("").is_empty());
    }

    #[test]
    fn test_expand_master_uses_directory_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let master = expand_master(dir.path()).unwrap();
        assert_eq!(master.path(), dir.path());
    }

    #[test]
    fn test_expand_master_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let stray = dir.path().join("master.txt");
        fs::write(&stray, b"not an archive").unwrap();
        assert!(expand_master(&stray).is_err());
    }

    #[test]
    fn test_zip_output_archives_contents_relative_to_root() {
        let out = tempfile::tempdir().unwrap();
        touch(&out.path().join("Residential Care/Policy_filled.docx"));
        touch(&out.path().join("run_report.csv"));

        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("filled.zip");
        zip_output(out.path(), &dest).unwrap();

        let mut archive = ZipArchive::new(fs::File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"Residential Care/".to_string()));
        assert!(names.contains(&"Residential Care/Policy_filled.docx".to_string()));
        assert!(names.contains(&"run_report.csv".to_string()));

        let mut contents = String::new();
        archive
            .by_name("run_report.csv")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "stub");
    }

    #[test]
    fn test_expand_master_unpacks_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("master.zip");
        let file = fs::File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("Residential Care/Policy.docx", options)
            .unwrap();
        writer.write_all(b"stub").unwrap();
        writer.finish().unwrap();

        let master = expand_master(&archive_path).unwrap();
        assert!(master.path().join("Residential Care/Policy.docx").exists());
    }
}
