use anyhow::Result;
use shardkv_shard::{Route, ShardConfig, ShardError, ShardMetadata};

static CONFIG: &str = r#"
[[shard]]
name = "moscow"
address = "localhost:8080"
shardId = 0

[[shard]]
name = "minsk"
address = "localhost:8081"
shardId = 1
"#;

#[test]
fn test_load_config_file() -> Result<()> {
    let path = test_helper::temp_file("toml");
    std::fs::write(&path, CONFIG)?;

    let config = ShardConfig::from_file(&path)?;
    std::fs::remove_file(&path)?;
    assert_eq!(config.shards.len(), 2);

    let metadata = ShardMetadata::build(&config.shards, "minsk")?;
    assert_eq!(metadata.current_shard_id(), 1);
    assert_eq!(metadata.leader_addr()?, "localhost:8081");
    assert_eq!(
        metadata.route("USA")?,
        Route::Remote("localhost:8080".to_string())
    );

    Ok(())
}

#[test]
fn test_missing_config_file() {
    let path = test_helper::temp_file("toml");
    let res = ShardConfig::from_file(path);
    assert!(matches!(res, Err(ShardError::Io(_))), "Got {res:?}");
}
