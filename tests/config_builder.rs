use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use SpanDB::consts::BLOCK_SIZE_U64;
use SpanDB::db::Db;
use SpanDB::{DbBuilder, Error, HashKind, OpenMode, SpanConfig};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("spdbtest-builder-{prefix}-{pid}-{t}-{id}"))
}

const ENV_VARS: [&str; 6] = [
    "SPDB_BUCKETS",
    "SPDB_HASH",
    "SPDB_READ_ONLY",
    "SPDB_OVERWRITE",
    "SPDB_PREALLOC_BLOCKS",
    "SPDB_FLUSH_ON_CLOSE",
];

// Все проверки env - в одном тесте: переменные окружения общие для процесса.
#[test]
fn env_overrides_and_builder() -> Result<()> {
    for v in ENV_VARS {
        std::env::remove_var(v);
    }
    assert_eq!(SpanConfig::from_env(), SpanConfig::default());

    std::env::set_var("SPDB_BUCKETS", "33");
    std::env::set_var("SPDB_HASH", "xx32");
    std::env::set_var("SPDB_PREALLOC_BLOCKS", "16");
    std::env::set_var("SPDB_FLUSH_ON_CLOSE", "0");
    let cfg = SpanConfig::from_env();
    assert_eq!(cfg.buckets, 33);
    assert_eq!(cfg.hash_kind, HashKind::Xx32Seed0);
    assert_eq!(cfg.prealloc_blocks, 16);
    assert!(!cfg.flush_on_close);
    assert!(!cfg.read_only && !cfg.overwrite);

    // мусор в env оставляет значение по умолчанию
    std::env::set_var("SPDB_BUCKETS", "many");
    std::env::set_var("SPDB_HASH", "md5");
    let cfg = SpanConfig::from_env();
    assert_eq!(cfg.buckets, 256);
    assert_eq!(cfg.hash_kind, HashKind::Xx64Seed0);

    // builder стартует с env, сеттеры побеждают
    std::env::set_var("SPDB_BUCKETS", "12");
    let cfg = Db::builder().hash_kind(HashKind::Xx64Seed0).prealloc_blocks(0).build();
    assert_eq!(cfg.buckets, 12);
    assert_eq!(cfg.hash_kind, HashKind::Xx64Seed0);
    assert_eq!(cfg.prealloc_blocks, 0);
    assert_eq!(DbBuilder::from_default().build(), SpanConfig::default());

    // Db::create/open читают env для остального
    let path = unique_path("env");
    {
        let mut db = Db::create(&path, 5)?;
        assert_eq!(db.dir.bucket_count, 5);
        assert_eq!(db.dir.hash_kind, HashKind::Xx32Seed0);
        db.put(b"k", b"v")?;
        // prealloc 16 из env
        assert!(db.file_size() >= 17 * BLOCK_SIZE_U64);
        db.flush()?;
    }
    {
        let db = Db::open_ro(&path)?;
        assert!(db.is_read_only());
        assert_eq!(db.get(b"k")?.as_deref(), Some(&b"v"[..]));
    }

    std::env::set_var("SPDB_READ_ONLY", "1");
    std::env::set_var("SPDB_OVERWRITE", "true");
    assert!(matches!(Db::open(&path), Err(Error::InvalidConfig(_))));

    for v in ENV_VARS {
        std::env::remove_var(v);
    }
    let _ = fs::remove_file(&path);
    Ok(())
}

#[test]
fn conflicting_flags_fail_before_io() -> Result<()> {
    let path = unique_path("conflict");
    let cfg = DbBuilder::from_default().read_only(true).overwrite(true).build();
    assert!(matches!(cfg.open_mode(), Err(Error::InvalidConfig(_))));
    assert!(matches!(
        Db::open_with_config(&path, cfg),
        Err(Error::InvalidConfig(_))
    ));
    assert!(!path.exists(), "no file may be created on a config error");

    assert_eq!(
        DbBuilder::from_default().overwrite(true).build().open_mode()?,
        OpenMode::CreateOverwrite
    );
    assert_eq!(
        DbBuilder::from_default().read_only(true).build().open_mode()?,
        OpenMode::ReadOnly
    );
    Ok(())
}

#[test]
fn bucket_count_is_validated() -> Result<()> {
    for bad in [0u32, 1008, u32::MAX] {
        let path = unique_path("buckets");
        let cfg = SpanConfig::default().with_buckets(bad);
        assert!(
            matches!(Db::open_with_config(&path, cfg), Err(Error::InvalidConfig(_))),
            "buckets={} must be rejected",
            bad
        );
        assert!(!path.exists());
    }

    let path = unique_path("buckets-max");
    let db = Db::open_with_config(&path, SpanConfig::default().with_buckets(1007))?;
    assert_eq!(db.dir.bucket_count, 1007);
    assert_eq!(db.stats()?.bucket_count, 1007);
    drop(db);
    let _ = fs::remove_file(&path);
    Ok(())
}

#[test]
fn flush_on_close_toggle() -> Result<()> {
    let path = unique_path("flush");
    let cfg = DbBuilder::from_default().buckets(3).flush_on_close(false).build();
    {
        let mut db = Db::open_with_config(&path, cfg.clone())?;
        db.put(b"a", b"1")?;
        db.close()?;
        db.close()?; // идемпотентно
    }
    // данные в page cache ОС видны следующему открытию и без msync
    let db = Db::open_with_config(&path, cfg)?;
    assert_eq!(db.config().buckets, 3);
    assert!(!db.config().flush_on_close);
    assert_eq!(db.get(b"a")?.as_deref(), Some(&b"1"[..]));
    assert!(db.config().to_string().contains("buckets: 3"));
    drop(db);
    let _ = fs::remove_file(&path);
    Ok(())
}
