//! Interactive selection of the images to process.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid choice '{0}' (expected 'gallery' or 'folder')")]
    InvalidSelection(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Ask where the images come from and collect their paths.
///
/// `gallery` reads one path per line until `done`; `folder` takes a
/// directory and returns its image files in name order.
pub fn prompt_source<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<Vec<PathBuf>, SourceError> {
    write!(output, "Load images from a gallery (enter paths) or a folder? (gallery/folder): ")?;
    output.flush()?;

    let choice = read_line(input)?.unwrap_or_default().trim().to_lowercase();
    match choice.as_str() {
        "gallery" => Ok(prompt_paths(input, output)?),
        "folder" => Ok(prompt_folder(input, output)?),
        _ => Err(SourceError::InvalidSelection(choice)),
    }
}

/// Read image paths until `done` (any case) or end of input.
fn prompt_paths<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    loop {
        write!(output, "Enter the path to an image (or 'done' to finish): ")?;
        output.flush()?;

        let Some(line) = read_line(input)? else {
            break;
        };
        let command = line.trim();
        if command.eq_ignore_ascii_case("done") {
            break;
        }
        if command.is_empty() {
            continue;
        }

        let path = PathBuf::from(&line);
        if path.is_file() {
            paths.push(path);
        } else {
            writeln!(output, "File not found. Please try again.")?;
        }
    }
    Ok(paths)
}

/// Ask for a directory until a valid one is given or input ends.
fn prompt_folder<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Vec<PathBuf>> {
    loop {
        write!(output, "Enter the folder containing the images: ")?;
        output.flush()?;

        let Some(line) = read_line(input)? else {
            return Ok(Vec::new());
        };
        let dir = PathBuf::from(&line);
        if dir.is_dir() {
            return images_in(&dir);
        }
        writeln!(output, "Folder not found. Please try again.")?;
    }
}

/// Image files directly inside `dir`, sorted by path.
pub fn images_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && image::ImageFormat::from_path(&path).is_ok() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Next line without its line ending, or `None` at end of input.
///
/// Other whitespace is kept so paths with leading or trailing spaces survive.
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let end = line.strip_suffix('\n').unwrap_or(&line);
    let end = end.strip_suffix('\r').unwrap_or(end);
    Ok(Some(end.to_string()))
}
