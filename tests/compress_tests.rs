mod common;

use std::{fs::File, path::PathBuf};

use autoarc::{Compressor, Extractor, Filter, Format};
use common::{Recorder, assert_single_terminal};
use tempfile::tempdir;

fn roundtrip(sources: Vec<PathBuf>, format: Format, filter: Filter, out: &std::path::Path) -> PathBuf {
    let mut recorder = Recorder::default();
    Compressor::new(sources, out, format, filter)
        .run(&mut recorder)
        .expect("compress ok");
    assert!(recorder.completed);
    assert_single_terminal(&recorder);
    assert_eq!(recorder.decide_destination.len(), 1);
    recorder.decide_destination[0].0.clone()
}

#[test]
fn compress_empty_file() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("empty.txt");
    File::create(&source).unwrap();
    let out = temp_dir.path().join("out");

    let archive = roundtrip(vec![source], Format::Tar, Filter::Gzip, &out);
    assert_eq!(archive, out.join("empty.tar.gz"));
    assert!(archive.exists());

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(&archive, &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");

    let restored = extract_dest.join("empty.txt");
    assert!(restored.exists());
    assert_eq!(std::fs::read_to_string(&restored).unwrap(), "");
}

#[test]
fn compress_one_file_with_content() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("file1.txt");
    std::fs::write(&source, "file1 with content").unwrap();
    let out = temp_dir.path().join("out");

    let archive = roundtrip(vec![source], Format::Zip, Filter::None, &out);
    assert_eq!(archive, out.join("file1.zip"));

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(&archive, &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");

    assert_eq!(
        std::fs::read_to_string(extract_dest.join("file1.txt")).unwrap(),
        "file1 with content"
    );
}

/// Compressing a directory tree to tar.gz and extracting it again
/// restores the same names, sizes and file types.
#[test]
fn tar_gz_round_trip_preserves_tree() {
    let temp_dir = tempdir().unwrap();
    let folder = temp_dir.path().join("folder");
    std::fs::create_dir_all(folder.join("sub")).unwrap();
    std::fs::write(folder.join("a.txt"), "alpha").unwrap();
    std::fs::write(folder.join("sub/b.txt"), "beta content").unwrap();
    std::fs::write(folder.join("sub/c.txt"), "").unwrap();
    let out = temp_dir.path().join("out");

    let archive = roundtrip(vec![folder.clone()], Format::Tar, Filter::Gzip, &out);
    assert_eq!(archive, out.join("folder.tar.gz"));

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(&archive, &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");
    assert_eq!(recorder.scanned, Some(5));

    let restored = extract_dest.join("folder");
    assert!(restored.is_dir());
    assert!(restored.join("sub").is_dir());
    assert_eq!(std::fs::read_to_string(restored.join("a.txt")).unwrap(), "alpha");
    assert_eq!(
        std::fs::read_to_string(restored.join("sub/b.txt")).unwrap(),
        "beta content"
    );
    assert_eq!(std::fs::read_to_string(restored.join("sub/c.txt")).unwrap(), "");
}

#[test]
fn derived_name_appends_counter_on_collision() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("notes.txt");
    std::fs::write(&source, "notes").unwrap();
    let out = temp_dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    std::fs::write(out.join("notes.tar"), "taken").unwrap();

    let archive = roundtrip(vec![source], Format::Tar, Filter::None, &out);
    assert_eq!(archive, out.join("notes(1).tar"));
    assert!(archive.exists());
}

#[test]
fn output_is_dest_uses_the_exact_path() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("file.txt");
    std::fs::write(&source, "content").unwrap();
    let archive = temp_dir.path().join("nested/dir/exact-name.tar");

    let mut recorder = Recorder::default();
    let mut compressor = Compressor::new(vec![source], &archive, Format::Tar, Filter::None);
    compressor.set_output_is_dest(true);
    compressor.run(&mut recorder).expect("compress ok");
    assert!(archive.exists());
    assert_eq!(recorder.decide_destination[0].0, archive);
}

#[test]
fn output_is_dest_refuses_an_existing_archive() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("file.txt");
    std::fs::write(&source, "content").unwrap();
    let archive = temp_dir.path().join("existing.tar");
    std::fs::write(&archive, "occupied").unwrap();

    let mut recorder = Recorder::default();
    let mut compressor = Compressor::new(vec![source], &archive, Format::Tar, Filter::None);
    compressor.set_output_is_dest(true);
    let result = compressor.run(&mut recorder);
    assert!(result.is_err());
    assert_eq!(recorder.errors.len(), 1);
    assert_single_terminal(&recorder);
}

#[test]
fn create_top_level_directory_wraps_the_sources() {
    let temp_dir = tempdir().unwrap();
    let folder = temp_dir.path().join("project");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("main.rs"), "fn main() {}").unwrap();
    let out = temp_dir.path().join("out");

    let mut recorder = Recorder::default();
    let mut compressor = Compressor::new(vec![folder], &out, Format::Tar, Filter::None);
    compressor.set_create_top_level_directory(true);
    compressor.run(&mut recorder).expect("compress ok");

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(out.join("project.tar"), &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");

    assert!(extract_dest.join("project/project/main.rs").exists());
}

#[test]
fn ar_archives_refuse_directory_sources() {
    let temp_dir = tempdir().unwrap();
    let folder = temp_dir.path().join("folder");
    std::fs::create_dir(&folder).unwrap();
    let out = temp_dir.path().join("out");

    let mut recorder = Recorder::default();
    let result = Compressor::new(vec![folder], &out, Format::ArBsd, Filter::None).run(&mut recorder);
    assert!(result.is_err());
    assert_eq!(recorder.errors.len(), 1);
    assert!(!recorder.completed);
}

#[cfg(unix)]
#[test]
fn zip_refuses_special_file_sources() {
    let temp_dir = tempdir().unwrap();
    let fifo = temp_dir.path().join("pipe");
    nix::unistd::mkfifo(&fifo, nix::sys::stat::Mode::from_bits_truncate(0o644)).unwrap();
    let out = temp_dir.path().join("out");

    let mut recorder = Recorder::default();
    let result = Compressor::new(vec![fifo], &out, Format::Zip, Filter::None).run(&mut recorder);
    assert!(result.is_err());
    assert!(!recorder.completed);
}

#[cfg(unix)]
#[test]
fn fifos_survive_a_tar_round_trip() {
    let temp_dir = tempdir().unwrap();
    let folder = temp_dir.path().join("folder");
    std::fs::create_dir(&folder).unwrap();
    nix::unistd::mkfifo(
        &folder.join("pipe"),
        nix::sys::stat::Mode::from_bits_truncate(0o644),
    )
    .unwrap();
    let out = temp_dir.path().join("out");

    let archive = roundtrip(vec![folder], Format::Tar, Filter::None, &out);

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(&archive, &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");

    use std::os::unix::fs::FileTypeExt;
    let meta = std::fs::symlink_metadata(extract_dest.join("folder/pipe")).unwrap();
    assert!(meta.file_type().is_fifo());
}

#[cfg(unix)]
#[test]
fn symlinks_are_stored_not_followed() {
    let temp_dir = tempdir().unwrap();
    let folder = temp_dir.path().join("folder");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("real.txt"), "real").unwrap();
    std::os::unix::fs::symlink("real.txt", folder.join("link")).unwrap();
    let out = temp_dir.path().join("out");

    let archive = roundtrip(vec![folder], Format::Tar, Filter::None, &out);

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(&archive, &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");

    let link = extract_dest.join("folder/link");
    let meta = std::fs::symlink_metadata(&link).unwrap();
    assert!(meta.file_type().is_symlink());
    assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("real.txt"));
}

#[cfg(unix)]
#[test]
fn hardlinks_are_coalesced_and_restored() {
    let temp_dir = tempdir().unwrap();
    let folder = temp_dir.path().join("folder");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("original.txt"), "shared body").unwrap();
    std::fs::hard_link(folder.join("original.txt"), folder.join("alias.txt")).unwrap();
    let out = temp_dir.path().join("out");

    let archive = roundtrip(vec![folder], Format::Tar, Filter::None, &out);

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(&archive, &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");

    use std::os::unix::fs::MetadataExt;
    let original = std::fs::metadata(extract_dest.join("folder/original.txt")).unwrap();
    let alias = std::fs::metadata(extract_dest.join("folder/alias.txt")).unwrap();
    assert_eq!(original.ino(), alias.ino());
    assert_eq!(
        std::fs::read_to_string(extract_dest.join("folder/alias.txt")).unwrap(),
        "shared body"
    );
}

#[test]
fn encrypted_zip_round_trip() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("secret.txt");
    std::fs::write(&source, "classified payload").unwrap();
    let out = temp_dir.path().join("out");

    let mut recorder = Recorder::default();
    let mut compressor = Compressor::new(vec![source], &out, Format::Zip, Filter::None);
    compressor.set_passphrase("hunter2");
    compressor.run(&mut recorder).expect("compress ok");

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(out.join("secret.zip"), &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.set_passphrase("hunter2");
    extractor.run(&mut recorder).expect("extract ok");

    assert_eq!(recorder.passphrase_requests, 0);
    assert_eq!(
        std::fs::read_to_string(extract_dest.join("secret.txt")).unwrap(),
        "classified payload"
    );
}

#[test]
fn ordered_multi_source_compression() {
    let temp_dir = tempdir().unwrap();
    let first = temp_dir.path().join("first.txt");
    let second = temp_dir.path().join("second.txt");
    std::fs::write(&first, "1").unwrap();
    std::fs::write(&second, "2").unwrap();
    let out = temp_dir.path().join("out");

    // The archive name is derived from the first source.
    let archive = roundtrip(vec![first, second], Format::Tar, Filter::None, &out);
    assert_eq!(archive, out.join("first.tar"));

    let extract_dest = temp_dir.path().join("extracted");
    let mut recorder = Recorder::default();
    let mut extractor = Extractor::new(&archive, &extract_dest);
    extractor.set_output_is_dest(true);
    extractor.run(&mut recorder).expect("extract ok");
    assert!(extract_dest.join("first.txt").exists());
    assert!(extract_dest.join("second.txt").exists());
}

#[test]
fn cancelled_compressor_emits_cancelled() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("file.txt");
    std::fs::write(&source, "content").unwrap();
    let out = temp_dir.path().join("out");

    let compressor = Compressor::new(vec![source], &out, Format::Tar, Filter::None);
    compressor.cancel_token().cancel();
    let mut recorder = Recorder::default();
    let result = compressor.run(&mut recorder);
    assert!(result.is_err());
    assert!(recorder.cancelled);
    assert!(!recorder.completed);
    assert_single_terminal(&recorder);
}
