use compio::archive::Archive;
use compio::config::CompioConfig;
use compio::file_handle::Whence;
use tempfile::NamedTempFile;

fn scratch_archive(config: CompioConfig) -> (Archive, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let archive = Archive::create(temp_file.path(), config).unwrap();
    (archive, temp_file)
}

#[test]
fn scenario_e_remove_and_recreate() {
    let (mut archive, _guard) = scratch_archive(CompioConfig::default());

    let mut a = archive.open_file("a").unwrap();
    archive.write(&mut a, b"hello").unwrap();
    let mut b = archive.open_file("b").unwrap();
    archive.write(&mut b, b"world").unwrap();

    archive.remove_file("a").unwrap();

    let mut a2 = archive.open_file("a").unwrap();
    let out = archive.read(&mut a2, 10).unwrap();
    assert!(out.is_empty());

    let mut b2 = archive.open_file("b").unwrap();
    let out_b = archive.read(&mut b2, 5).unwrap();
    assert_eq!(out_b, b"world");
    assert_eq!(archive.stat("b").unwrap(), 5);
}

#[test]
fn write_past_eof_reads_zero_filled_hole_then_data() {
    let (mut archive, _guard) = scratch_archive(CompioConfig::default());
    let mut handle = archive.open_file("a").unwrap();

    archive.seek(&mut handle, 10, Whence::Set).unwrap();
    archive.write(&mut handle, b"X").unwrap();
    assert_eq!(archive.stat("a").unwrap(), 11);

    archive.seek(&mut handle, 0, Whence::Set).unwrap();
    let out = archive.read(&mut handle, 11).unwrap();
    assert_eq!(out, b"\0\0\0\0\0\0\0\0\0\0X");
}

#[test]
fn remove_then_reopen_in_write_mode_creates_fresh_entry() {
    let (mut archive, _guard) = scratch_archive(CompioConfig::default());
    let mut a = archive.open_file("a").unwrap();
    archive.write(&mut a, b"first").unwrap();
    archive.remove_file("a").unwrap();

    let mut a2 = archive.open_file("a").unwrap();
    assert_eq!(archive.stat("a").unwrap(), 0);
    archive.write(&mut a2, b"second").unwrap();
    archive.seek(&mut a2, 0, Whence::Set).unwrap();
    let out = archive.read(&mut a2, 6).unwrap();
    assert_eq!(out, b"second");
}

#[test]
fn opening_zero_length_file_in_read_mode_fails() {
    let temp_file = NamedTempFile::new().unwrap();
    let err = Archive::open(temp_file.path(), "r", CompioConfig::default());
    assert!(err.is_err());
}

#[test]
fn seek_past_end_then_write_creates_hole_consistent_with_size() {
    let (mut archive, _guard) = scratch_archive(CompioConfig { block_size: 8, ..Default::default() });
    let mut handle = archive.open_file("a").unwrap();

    archive.write(&mut handle, b"AAAAAAAABBBBBBBBCCCCCCCC").unwrap();
    archive.seek(&mut handle, 6, Whence::Set).unwrap();
    archive.write(&mut handle, b"xxxxxx").unwrap();

    archive.seek(&mut handle, 0, Whence::Set).unwrap();
    let out = archive.read(&mut handle, 24).unwrap();
    assert_eq!(out, b"AAAAAAxxxxxxBBBBCCCCCCCC");
}

#[test]
fn persists_across_close_and_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    {
        let mut archive = Archive::create(temp_file.path(), CompioConfig::default()).unwrap();
        let mut handle = archive.open_file("notes").unwrap();
        archive.write(&mut handle, b"persisted bytes").unwrap();
        archive.close().unwrap();
    }

    let mut archive = Archive::open(temp_file.path(), "r+", CompioConfig::default()).unwrap();
    let mut handle = archive.open_file("notes").unwrap();
    let out = archive.read(&mut handle, 15).unwrap();
    assert_eq!(out, b"persisted bytes");
}
