use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use SpanDB::db::Db;
use SpanDB::SpanConfig;

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("spdb-{}-{}-{}", prefix, pid, t))
}

#[test]
fn compact_bucket_keeps_last_values_and_shrinks() -> Result<()> {
    let path = unique_path("compact-one");
    let mut db = Db::open_with_config(&path, SpanConfig::default().with_buckets(1))?;

    let v1 = vec![0x01; 200];
    let v2 = vec![0x02; 200];
    for i in 0..100u32 {
        db.put(format!("k{:03}", i).as_bytes(), &v1)?;
    }
    for i in 0..100u32 {
        db.put(format!("k{:03}", i).as_bytes(), &v2)?;
    }
    for i in (0..100u32).filter(|i| i % 4 == 0) {
        assert!(db.delete(format!("k{:03}", i).as_bytes())?);
    }

    let rep = db.compact_bucket(0)?;
    assert_eq!(rep.records_before, 225);
    assert_eq!(rep.keys_kept, 75);
    assert!(rep.blocks_after < rep.blocks_before, "{:?}", rep);
    assert_ne!(rep.new_head, rep.old_head, "live records go to a fresh extent");
    assert_eq!(db.bucket_head(0)?, rep.new_head);

    // старый экстент целиком во free-цепочке
    assert_eq!(db.pager.meta.free_count as u64, rep.blocks_before);
    assert_eq!(db.metrics().compactions, 1);

    for i in 0..100u32 {
        let got = db.get(format!("k{:03}", i).as_bytes())?;
        if i % 4 == 0 {
            assert!(got.is_none());
        } else {
            assert_eq!(got, Some(v2.clone()));
        }
    }
    let scan = db.scan_bucket(0)?;
    assert_eq!(scan.records, 75);
    assert_eq!(scan.tombstones, 0);
    assert!(db.doctor()?.is_clean());

    // повторная компактация ничего не выигрывает
    let again = db.compact_bucket(0)?;
    assert_eq!(again.blocks_after, again.blocks_before);

    drop(db);
    let _ = fs::remove_file(&path);
    Ok(())
}

#[test]
fn compact_all_tombstones_returns_bucket_to_small() -> Result<()> {
    let path = unique_path("compact-empty");
    let mut db = Db::open_with_config(&path, SpanConfig::default().with_buckets(1))?;

    let val = vec![0x33; 1000];
    for i in 0..20u32 {
        db.put(format!("gone-{}", i).as_bytes(), &val)?;
    }
    for i in 0..20u32 {
        db.delete(format!("gone-{}", i).as_bytes())?;
    }
    let head = db.bucket_head(0)?;
    assert!(!db.pager.extent(head)?.is_small());

    let rep = db.compact_bucket(0)?;
    assert_eq!(rep.keys_kept, 0);
    assert_eq!(rep.new_head, head, "empty bucket is shrunk in place");
    assert_eq!(rep.blocks_after, 1);
    let ext = db.pager.extent(head)?;
    assert!(ext.is_small());
    assert!(db.pager.data(&ext, 0)?.iter().all(|&b| b == 0));
    assert_eq!(db.scan_bucket(0)?.records, 0);
    assert!(db.doctor()?.is_clean());

    drop(db);
    let _ = fs::remove_file(&path);
    Ok(())
}

#[test]
fn compact_all_survives_reopen() -> Result<()> {
    let path = unique_path("compact-all");
    let cfg = SpanConfig::default().with_buckets(8);
    {
        let mut db = Db::open_with_config(&path, cfg.clone())?;
        for round in 0..3u8 {
            for i in 0..400u32 {
                db.put(format!("key-{}", i).as_bytes(), &[round; 64])?;
            }
        }
        let sum = db.compact_all()?;
        assert_eq!(sum.buckets_total, 8);
        assert!(sum.buckets_compacted > 0 && sum.buckets_compacted <= 8);
        assert_eq!(sum.keys_kept_sum, 400);
        assert!(sum.blocks_after_sum < sum.blocks_before_sum);
        db.close()?;
    }
    {
        let db = Db::open_with_config(&path, cfg.with_read_only(true))?;
        assert_eq!(db.len()?, 400);
        for i in 0..400u32 {
            assert_eq!(db.get(format!("key-{}", i).as_bytes())?, Some(vec![2u8; 64]));
        }
        let rep = db.doctor()?;
        assert!(rep.is_clean(), "{}", rep.to_json());
        assert_eq!(rep.records, 400);
    }
    let _ = fs::remove_file(&path);
    Ok(())
}
