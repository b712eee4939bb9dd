mod common;

use std::fs;

use anyhow::Result;
use rstest::rstest;
use zipforge::{
    ArchiveBuilder, ArchiveConfig, EmptyBehavior, Error, FilesetConfig, RelocatedFileSet,
    ScanOptions, StorageMethod, TreeScanner, is_up_to_date,
};

use common::{TestTree, ZipReader, init_tracing};

fn fileset(tree: &TestTree) -> FilesetConfig {
    FilesetConfig::for_dir(tree.path())
}

fn config_for(tree: &TestTree, destination: &std::path::Path) -> ArchiveConfig {
    let mut config = ArchiveConfig::new(destination);
    config.filesets.push(fileset(tree));
    config
}

#[test]
fn build_emits_directories_before_files_in_stable_order() -> Result<()> {
    init_tracing();
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    let config = config_for(&tree, &dest);
    assert!(config.execute()?);

    let reader = ZipReader::open(&dest)?;
    assert_eq!(
        reader.names(),
        [
            "alpha/",
            "alpha/beta/",
            "alpha/beta/gamma/",
            "delta/",
            "alpha/beta/beta.xml",
            "alpha/beta/gamma/gamma.xml",
            "delta/delta.xml",
        ]
    );
    Ok(())
}

#[test]
fn rebuild_without_changes_is_skipped() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    // The archive lands inside the scanned tree; keep it out of the scan so
    // the staleness check only sees real sources.
    let mut config = config_for(&tree, &dest);
    config.filesets[0].excludes.push("out.zip".to_string());

    assert!(config.execute()?);
    assert!(!config.execute()?, "second build must be a no-op");
    Ok(())
}

#[test]
fn touching_a_source_forces_a_rebuild() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    let mut config = config_for(&tree, &dest);
    config.filesets[0].excludes.push("out.zip".to_string());
    assert!(config.execute()?);

    let future = filetime::FileTime::from_unix_time(
        filetime::FileTime::now().unix_seconds() + 60,
        0,
    );
    filetime::set_file_mtime(tree.path().join("delta/delta.xml"), future)?;
    assert!(config.execute()?, "newer source must trigger a rebuild");
    Ok(())
}

#[test]
fn absent_destination_is_never_up_to_date() -> Result<()> {
    let tree = TestTree::new()?;
    let scan = TreeScanner::new(tree.path(), &["**"], &[], ScanOptions::default())?.scan()?;
    let dest = tree.path().join("missing.zip");
    assert!(!is_up_to_date(&[scan], &dest, EmptyBehavior::Skip)?);
    Ok(())
}

#[rstest]
#[case(EmptyBehavior::Skip)]
#[case(EmptyBehavior::Create)]
fn empty_selection_reports_up_to_date(#[case] behavior: EmptyBehavior) -> Result<()> {
    let tree = TestTree::new()?;
    let scan =
        TreeScanner::new(tree.path(), &["nothing/**"], &[], ScanOptions::default())?.scan()?;
    let dest = tree.path().join("out.zip");
    assert!(is_up_to_date(&[scan], &dest, behavior)?);
    Ok(())
}

#[test]
fn empty_selection_with_skip_touches_nothing() -> Result<()> {
    let tree = TestTree::new()?;
    let scan =
        TreeScanner::new(tree.path(), &["nothing/**"], &[], ScanOptions::default())?.scan()?;
    let dest = tree.path().join("out.zip");
    is_up_to_date(&[scan], &dest, EmptyBehavior::Skip)?;
    assert!(!dest.exists());
    Ok(())
}

#[test]
fn empty_selection_with_fail_raises_a_build_failure() -> Result<()> {
    let tree = TestTree::new()?;
    let scan =
        TreeScanner::new(tree.path(), &["nothing/**"], &[], ScanOptions::default())?.scan()?;
    let dest = tree.path().join("out.zip");
    let err = is_up_to_date(&[scan], &dest, EmptyBehavior::Fail).unwrap_err();
    assert!(matches!(err, Error::Build(_)));
    assert!(!dest.exists());
    Ok(())
}

#[test]
fn empty_selection_with_create_writes_the_minimal_archive() -> Result<()> {
    init_tracing();
    let tree = TestTree::new()?;
    let scan =
        TreeScanner::new(tree.path(), &["nothing/**"], &[], ScanOptions::default())?.scan()?;
    let dest = tree.path().join("out.zip");
    assert!(is_up_to_date(&[scan], &dest, EmptyBehavior::Create)?);

    let bytes = fs::read(&dest)?;
    assert_eq!(bytes.len(), 22);
    assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x05, 0x06]);
    assert!(bytes[4..].iter().all(|b| *b == 0));
    assert!(ZipReader::parse(bytes)?.entries.is_empty());
    Ok(())
}

#[test]
fn empty_selection_with_create_keeps_an_existing_destination() -> Result<()> {
    let tree = TestTree::new()?;
    let scan =
        TreeScanner::new(tree.path(), &["nothing/**"], &[], ScanOptions::default())?.scan()?;
    let dest = tree.path().join("out.zip");
    fs::write(&dest, b"sentinel")?;
    assert!(is_up_to_date(&[scan], &dest, EmptyBehavior::Create)?);
    assert_eq!(fs::read(&dest)?, b"sentinel");
    Ok(())
}

#[test]
fn stored_entries_embed_verbatim_bytes_with_matching_checksums() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("stored.zip");
    let mut config = config_for(&tree, &dest);
    config.method = StorageMethod::Stored;
    config.filesets[0].excludes.push("stored.zip".to_string());
    assert!(config.execute()?);

    let reader = ZipReader::open(&dest)?;
    for entry in reader.entries.iter().filter(|e| !e.is_dir()) {
        assert_eq!(entry.method, 0, "{} must be stored", entry.name);
        assert_eq!(entry.compressed_size, entry.uncompressed_size);
        let content = reader.content(entry)?;
        let on_disk = fs::read(tree.path().join(&entry.name))?;
        assert_eq!(content, on_disk, "{} content", entry.name);
        assert_eq!(entry.crc, crc32fast::hash(&content), "{} checksum", entry.name);
    }
    Ok(())
}

#[test]
fn deflated_entries_round_trip_through_inflate() -> Result<()> {
    let tree = TestTree::new()?;
    // Give deflate something compressible.
    fs::write(tree.path().join("delta/big.txt"), "repeat ".repeat(2048))?;
    let dest = tree.path().join("deflated.zip");
    let mut config = config_for(&tree, &dest);
    config.filesets[0].excludes.push("deflated.zip".to_string());
    assert!(config.execute()?);

    let reader = ZipReader::open(&dest)?;
    let entry = reader.entry("delta/big.txt").expect("entry exists");
    assert_eq!(entry.method, 8);
    assert!(entry.compressed_size < entry.uncompressed_size);
    let content = reader.content(entry)?;
    assert_eq!(content, fs::read(tree.path().join("delta/big.txt"))?);
    assert_eq!(entry.crc, crc32fast::hash(&content));
    Ok(())
}

#[test]
fn overlapping_filesets_emit_each_directory_once() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    let mut config = ArchiveConfig::new(&dest);

    // Two filesets sharing the alpha/beta ancestry but selecting disjoint
    // files.
    let mut first = fileset(&tree);
    first.includes.push("alpha/beta/beta.xml".to_string());
    config.filesets.push(first);
    let mut second = fileset(&tree);
    second.includes.push("alpha/beta/gamma/**".to_string());
    config.filesets.push(second);
    assert!(config.execute()?);

    let reader = ZipReader::open(&dest)?;
    let names = reader.names();
    let mut deduped = names.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), names.len(), "duplicate entries in archive");
    assert_eq!(names.iter().filter(|n| **n == "alpha/beta/").count(), 1);
    assert!(reader.entry("alpha/beta/beta.xml").is_some());
    assert!(reader.entry("alpha/beta/gamma/gamma.xml").is_some());
    Ok(())
}

#[test]
fn relocation_prefix_reroots_entries_and_emits_its_chain() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    let mut config = config_for(&tree, &dest);
    config.filesets[0].prefix = "bundle/payload".to_string();
    config.filesets[0].includes.push("delta/**".to_string());
    assert!(config.execute()?);

    let reader = ZipReader::open(&dest)?;
    assert_eq!(
        reader.names(),
        [
            "bundle/",
            "bundle/payload/",
            "bundle/payload/delta/",
            "bundle/payload/delta/delta.xml",
        ]
    );
    Ok(())
}

#[test]
fn shared_prefix_across_filesets_is_deduplicated() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    let mut config = config_for(&tree, &dest);
    config.filesets[0].prefix = "docs".to_string();
    config.filesets[0].includes.push("alpha/**".to_string());
    let mut second = fileset(&tree);
    second.prefix = "docs/".to_string();
    second.includes.push("delta/**".to_string());
    config.filesets.push(second);
    assert!(config.execute()?);

    let reader = ZipReader::open(&dest)?;
    let docs_entries = reader.names().iter().filter(|n| **n == "docs/").count();
    assert_eq!(docs_entries, 1);
    assert!(reader.entry("docs/alpha/beta/beta.xml").is_some());
    assert!(reader.entry("docs/delta/delta.xml").is_some());
    Ok(())
}

#[test]
fn relocated_groups_precede_plain_groups() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    let mut config = ArchiveConfig::new(&dest);

    let mut plain = fileset(&tree);
    plain.includes.push("alpha/beta/gamma/**".to_string());
    config.filesets.push(plain);

    let mut relocated = fileset(&tree);
    relocated.prefix = "extra".to_string();
    relocated.includes.push("delta/**".to_string());
    config.filesets.push(relocated);

    assert!(config.execute()?);
    let reader = ZipReader::open(&dest)?;
    let names = reader.names();
    let first_relocated = names.iter().position(|n| n.starts_with("extra/")).unwrap();
    let first_plain = names.iter().position(|n| n.starts_with("alpha/")).unwrap();
    assert!(first_relocated < first_plain, "relocated group must come first");
    Ok(())
}

#[test]
fn io_failure_during_build_removes_the_partial_destination() -> Result<()> {
    let tree = TestTree::new()?;
    let scan = TreeScanner::new(tree.path(), &["**"], &[], ScanOptions::default())?.scan()?;
    // Invalidate a source after scanning so the writer trips mid-build.
    fs::remove_file(tree.path().join("delta/delta.xml"))?;

    let dest = tree.path().join("out.zip");
    let err = ArchiveBuilder::new(StorageMethod::Deflated)
        .build(&[], &[scan], &dest)
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(!dest.exists(), "partial archive must be cleaned up");
    Ok(())
}

#[test]
fn directory_entries_are_stored_with_empty_checksum() -> Result<()> {
    let tree = TestTree::new()?;
    let dest = tree.path().join("out.zip");
    let mut config = config_for(&tree, &dest);
    config.filesets[0].excludes.push("out.zip".to_string());
    assert!(config.execute()?);

    let reader = ZipReader::open(&dest)?;
    for entry in reader.entries.iter().filter(|e| e.is_dir()) {
        assert_eq!(entry.method, 0, "{} must be stored", entry.name);
        assert_eq!(entry.uncompressed_size, 0);
        assert_eq!(entry.crc, crc32fast::hash(b""), "{} checksum", entry.name);
    }
    Ok(())
}

#[test]
fn relocated_sets_can_drive_the_builder_directly() -> Result<()> {
    let tree = TestTree::new()?;
    let scan = TreeScanner::new(
        tree.path(),
        &["delta/**"],
        &[],
        ScanOptions::default(),
    )?
    .scan()?;
    let dest = tree.path().join("direct.zip");
    ArchiveBuilder::new(StorageMethod::Deflated).build(
        &[RelocatedFileSet {
            scan,
            prefix: "lib".to_string(),
        }],
        &[],
        &dest,
    )?;

    let reader = ZipReader::open(&dest)?;
    assert_eq!(
        reader.names(),
        ["lib/", "lib/delta/", "lib/delta/delta.xml"]
    );
    Ok(())
}
