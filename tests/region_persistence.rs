use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use SpanDB::consts::BLOCK_SIZE_U64;
use SpanDB::region::{OpenMode, Region};
use SpanDB::Error;

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("spdb-{}-{}-{}", prefix, pid, t))
}

#[test]
fn region_bytes_survive_reopen() -> Result<()> {
    let path = unique_path("region-persist");

    // 1) CreateOverwrite, 8 байт в начало
    {
        let mut r = Region::open(&path, OpenMode::CreateOverwrite)?;
        r.ensure_capacity(BLOCK_SIZE_U64)?;
        r.write(0, b"spandb!!")?;
        r.flush()?;
        r.close()?;
    }

    // 2) ReadWrite: байты на месте, размер ровно один блок
    {
        let r = Region::open(&path, OpenMode::ReadWrite)?;
        assert_eq!(r.current_size(), BLOCK_SIZE_U64);
        assert_eq!(r.read(0, 8)?, b"spandb!!");
    }

    // 3) CreateOverwrite усекает
    {
        let r = Region::open(&path, OpenMode::CreateOverwrite)?;
        assert_eq!(r.current_size(), 0);
        assert!(r.bytes().is_empty());
    }
    assert_eq!(fs::metadata(&path)?.len(), 0);

    let _ = fs::remove_file(&path);
    Ok(())
}

#[test]
fn region_open_errors() -> Result<()> {
    // ReadOnly требует существующий файл
    let missing = unique_path("region-missing");
    assert!(matches!(
        Region::open(&missing, OpenMode::ReadOnly),
        Err(Error::NotFound(_))
    ));
    assert!(!missing.exists());

    // Невыровненный размер -> Corrupt
    let odd = unique_path("region-odd");
    fs::write(&odd, vec![0u8; 100])?;
    let err = Region::open(&odd, OpenMode::ReadWrite).err().expect("unaligned must fail");
    assert!(err.is_corrupt(), "got {:?}", err);
    let _ = fs::remove_file(&odd);

    // Конфликт флагов ловится до I/O
    assert!(matches!(
        OpenMode::from_flags(true, true),
        Err(Error::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn region_lock_excludes_second_writer() -> Result<()> {
    let path = unique_path("region-lock");
    let w = Region::open(&path, OpenMode::CreateOverwrite)?;
    assert!(matches!(
        Region::open(&path, OpenMode::ReadWrite),
        Err(Error::Locked(_))
    ));
    assert!(matches!(
        Region::open(&path, OpenMode::ReadOnly),
        Err(Error::Locked(_))
    ));
    drop(w);

    // читатели сосуществуют
    let r1 = Region::open(&path, OpenMode::ReadOnly)?;
    let r2 = Region::open(&path, OpenMode::ReadOnly)?;
    assert!(matches!(
        Region::open(&path, OpenMode::ReadWrite),
        Err(Error::Locked(_))
    ));
    drop((r1, r2));

    let _ = fs::remove_file(&path);
    Ok(())
}
