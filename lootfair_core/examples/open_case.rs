use std::sync::Arc;

use lootfair_core::{
    verify_roll, CaseOpener, EngineConfig, FairnessEngine, MemoryAuditLog, MemorySeedStore,
    StaticCatalog, WeightedItem,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example end-to-end: commit, open three times, rotate, verify
    let items = vec![
        WeightedItem::new("dragon-lore", 1.0),
        WeightedItem::new("asiimov", 9.0),
        WeightedItem::new("sticker", 90.0),
    ];
    let catalog = StaticCatalog::new().with_case("starter", items.clone());
    let audit = Arc::new(MemoryAuditLog::new());
    let engine = FairnessEngine::new(Arc::new(MemorySeedStore::new()), EngineConfig::default());
    let opener = CaseOpener::new(engine, Arc::new(catalog), audit.clone());

    let info = opener.engine().seed_info("demo-user").await?;
    println!("committed server_seed_hash={}", info.server_seed_hash);

    for _ in 0..3 {
        let opening = opener.open_case("demo-user", "starter", None).await?;
        println!(
            "nonce={} roll={:.8} item={}",
            opening.nonce_used, opening.roll_value, opening.winning_item_id
        );
    }

    let rotation = opener.engine().rotate_server_seed("demo-user", None).await?;
    println!("revealed server_seed={}", rotation.revealed_server_seed);
    for nonce in 1..=3 {
        let v = verify_roll(&rotation.revealed_server_seed, &info.client_seed, nonce, Some(&items))?;
        println!("verified nonce={} item={:?}", nonce, v.winning_item_id);
    }
    Ok(())
}
