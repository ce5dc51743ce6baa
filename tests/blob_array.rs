use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use SpanDB::consts::{BLOB_HDR_SIZE, BLOCK_PAYLOAD, BLOCK_SIZE, BLOCK_SIZE_U64, LEVEL_ONE};
use SpanDB::hash::HashKind;
use SpanDB::page::header_commit;
use SpanDB::pager::{Array, Blob, Pager};
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

fn fresh_pager(path: &PathBuf) -> Result<Pager> {
    let r = Region::open(path, OpenMode::CreateOverwrite)?;
    Ok(Pager::init(r, 4, HashKind::Xx64Seed0, 8)?)
}

fn pattern(len: usize, salt: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ salt).collect()
}

/// Смещение содержимого, с которого начинается логический блок LEVEL_ONE.
fn level_one_edge() -> u64 {
    LEVEL_ONE as u64 * BLOCK_PAYLOAD as u64 - BLOB_HDR_SIZE as u64
}

#[test]
fn blob_spans_the_indirect_boundary() -> Result<()> {
    let path = unique_path("blob-edge");
    let mut pg = fresh_pager(&path)?;
    let blob = Blob::create(&mut pg)?;
    assert_eq!(blob.len(&pg)?, 0);
    assert!(blob.is_empty(&pg)?);

    let head_bytes = pattern(100, 0x11);
    blob.set(&mut pg, &head_bytes)?;
    assert_eq!(blob.read_all(&pg)?, head_bytes);
    assert!(pg.extent(blob.head)?.is_small());
    assert_eq!(blob.capacity(&pg)?, (BLOCK_PAYLOAD - BLOB_HDR_SIZE) as u64);

    // рост за первые LEVEL_ONE блоков: хвост читается нулями
    let big = level_one_edge() + 3 * BLOCK_PAYLOAD as u64;
    blob.resize(&mut pg, big)?;
    assert_eq!(blob.len(&pg)?, big);
    let ext = pg.extent(blob.head)?;
    assert_eq!(ext.block_count, LEVEL_ONE + 3);
    assert_eq!(pg.resolve_path(blob.head, LEVEL_ONE)?.hops(), 2);
    assert_eq!(blob.read(&pg, 0, 100)?, head_bytes);
    assert!(blob.read(&pg, big - 4096, 4096)?.iter().all(|&b| b == 0));

    // запись поперёк блоков 511 | 512
    let edge = level_one_edge();
    let across = pattern(3 * BLOCK_PAYLOAD, 0x5A);
    blob.write(&mut pg, edge - 1000, &across)?;
    assert_eq!(blob.read(&pg, edge - 1000, across.len())?, across);
    assert_eq!(blob.read(&pg, edge - 1, 2)?, across[999..1001].to_vec());

    assert!(matches!(
        blob.write(&mut pg, big - 1, b"xy"),
        Err(Error::ByteRange { .. })
    ));
    assert!(matches!(
        blob.read(&pg, big, 1),
        Err(Error::ByteRange { .. })
    ));
    pg.flush()?;
    drop(pg);

    // переоткрытие: то же содержимое
    let r = Region::open(&path, OpenMode::ReadWrite)?;
    let mut pg = Pager::open(r, 0)?;
    let blob = Blob::open(&pg, blob.head)?;
    assert_eq!(blob.len(&pg)?, big);
    assert_eq!(blob.read(&pg, edge - 1000, across.len())?, across);

    // усечение обратно в голову: данные до длины целы, блоки во free-цепочке
    blob.resize(&mut pg, 50)?;
    assert!(pg.extent(blob.head)?.is_small());
    assert_eq!(pg.meta.free_count, LEVEL_ONE + 3 + 1);
    assert_eq!(blob.read_all(&pg)?, head_bytes[..50].to_vec());
    // отброшенные байты не возвращаются при повторном росте
    blob.resize(&mut pg, 200)?;
    let back = blob.read_all(&pg)?;
    assert_eq!(&back[..50], &head_bytes[..50]);
    assert!(back[50..].iter().all(|&b| b == 0));
    assert!(pg.verify_extent(blob.head).is_ok());

    blob.destroy(&mut pg)?;
    drop(pg);
    let _ = fs::remove_file(&path);
    Ok(())
}

#[test]
fn truncate_within_regular_blob_zeroes_tail() -> Result<()> {
    let path = unique_path("blob-trunc");
    let mut pg = fresh_pager(&path)?;
    let blob = Blob::create(&mut pg)?;
    let data = pattern(5 * BLOCK_PAYLOAD, 0x33);
    blob.set(&mut pg, &data)?;
    let blocks = pg.extent(blob.head)?.block_count;
    assert_eq!(blocks, 6);

    let cut = 2 * BLOCK_PAYLOAD as u64 + 17;
    blob.resize(&mut pg, cut)?;
    assert_eq!(pg.extent(blob.head)?.block_count, 3);
    blob.resize(&mut pg, data.len() as u64)?;
    let back = blob.read_all(&pg)?;
    assert_eq!(&back[..cut as usize], &data[..cut as usize]);
    assert!(back[cut as usize..].iter().all(|&b| b == 0));

    drop(pg);
    let _ = fs::remove_file(&path);
    Ok(())
}

#[test]
fn blob_length_beyond_capacity_is_corrupt() -> Result<()> {
    let path = unique_path("blob-len");
    let head = {
        let mut pg = fresh_pager(&path)?;
        let blob = Blob::create(&mut pg)?;
        blob.set(&mut pg, b"ten bytes!")?;
        pg.flush()?;
        blob.head
    };

    // длина больше ёмкости small-головы, checksum перезапечатан
    let mut f = OpenOptions::new().read(true).write(true).open(&path)?;
    let mut blk = vec![0u8; BLOCK_SIZE];
    f.seek(SeekFrom::Start(head as u64 * BLOCK_SIZE_U64))?;
    f.read_exact(&mut blk)?;
    blk[..8].copy_from_slice(&(BLOCK_PAYLOAD as u64).to_le_bytes());
    header_commit(&mut blk, 0);
    f.seek(SeekFrom::Start(head as u64 * BLOCK_SIZE_U64))?;
    f.write_all(&blk)?;
    f.sync_all()?;
    drop(f);

    let r = Region::open(&path, OpenMode::ReadOnly)?;
    let pg = Pager::open(r, 0)?;
    let err = Blob::open(&pg, head).err().expect("length past capacity");
    assert!(err.is_corrupt(), "got {:?}", err);
    assert!(pg.is_quarantined(head));

    drop(pg);
    let _ = fs::remove_file(&path);
    Ok(())
}

fn item(i: u64) -> Vec<u8> {
    let mut v = i.to_le_bytes().to_vec();
    v.extend_from_slice(&[0xEE; 4]);
    v
}

#[test]
fn array_push_pop_across_boundary() -> Result<()> {
    let path = unique_path("array-edge");
    let mut pg = fresh_pager(&path)?;
    // 12 не делит 4088: элементы пересекают границы блоков
    let arr = Array::create(&mut pg, 12)?;
    assert_eq!(arr.pop(&mut pg)?, None);

    let below = level_one_edge() / 12 - 100;
    arr.resize(&mut pg, below)?;
    assert!(pg.extent(arr.head())?.block_count <= LEVEL_ONE);
    assert_eq!(arr.get(&pg, 0)?, vec![0u8; 12]);
    arr.set(&mut pg, 0, &item(7))?;
    assert_eq!(arr.get(&pg, 0)?, item(7));

    for k in 0..1000u64 {
        assert_eq!(arr.push(&mut pg, &item(k))?, below + k);
    }
    assert_eq!(arr.len(&pg)?, below + 1000);
    assert!(pg.extent(arr.head())?.block_count > LEVEL_ONE);
    for k in [0u64, 99, 100, 101, 500, 999] {
        assert_eq!(arr.get(&pg, below + k)?, item(k));
    }

    assert!(matches!(
        arr.get(&pg, below + 1000),
        Err(Error::IndexOutOfRange { .. })
    ));
    assert!(matches!(
        arr.set(&mut pg, 1, b"short"),
        Err(Error::ItemSize { expected: 12, got: 5 })
    ));
    assert!(matches!(
        arr.push(&mut pg, &[0u8; 13]),
        Err(Error::ItemSize { .. })
    ));
    pg.flush()?;
    drop(pg);

    let r = Region::open(&path, OpenMode::ReadWrite)?;
    let mut pg = Pager::open(r, 0)?;
    let arr = Array::open(&pg, arr.head(), 12)?;
    assert!(matches!(
        Array::open(&pg, arr.head(), 0),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(arr.get(&pg, 0)?, item(7));

    let free_before = pg.meta.free_count;
    for k in (0..1000u64).rev() {
        assert_eq!(arr.pop(&mut pg)?, Some(item(k)));
    }
    assert_eq!(arr.len(&pg)?, below);
    assert!(pg.extent(arr.head())?.block_count <= LEVEL_ONE);
    assert!(pg.meta.free_count > free_before);

    arr.resize(&mut pg, 0)?;
    assert!(arr.is_empty(&pg)?);
    assert!(pg.extent(arr.head())?.is_small());

    drop(pg);
    let _ = fs::remove_file(&path);
    Ok(())
}
