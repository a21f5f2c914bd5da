//! weft-fab - Demonstration fabrication work loop
//!
//! Stands up an in-memory store with the demo catalog, creates a
//! production chain bound to the demo library, and runs the
//! schedule/fabricate/finalize loop until the chain completes or the
//! requested segment count is reached.

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use weft_common::access::{Access, UserRole};
use weft_common::config::FabricationConfig;
use weft_common::entity::chain::{BindingTarget, ChainBinding, ChainState, ChainType};
use weft_common::entity::segment::SegmentState;
use weft_common::events::NotificationBus;
use weft_common::store::EntityStore;
use weft_fab::chain_manager::{ChainCreate, ChainManager};
use weft_fab::segment_manager::SegmentManager;
use weft_fab::{Fabricator, RandomSource, SchedulingDecision};

#[derive(Parser, Debug)]
#[command(name = "weft-fab", version, about = "Procedural music fabrication demo loop")]
struct Args {
    /// Seed for reproducible selection; omit for entropy
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum number of segments to fabricate
    #[arg(long, default_value_t = 8)]
    segments: u32,

    /// Chain length in seconds (stop instant relative to start)
    #[arg(long, default_value_t = 60)]
    length_seconds: i64,

    /// Optional TOML config file
    #[arg(long, env = "WEFT_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting weft-fab v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => FabricationConfig::load(path)?,
        None => FabricationConfig::default(),
    };
    let store = Arc::new(EntityStore::new());
    let bus = NotificationBus::new(64);
    let mut notifications = bus.subscribe();
    let content = weft_fab::fixture::demo_content();
    let catalog = Arc::new(content.catalog);

    let chains = ChainManager::new(store.clone(), config.clone(), bus.clone());
    let segments = SegmentManager::new(store.clone(), config.clone());
    let access = Access::user(vec![content.account_id], vec![UserRole::Engineer]);

    let start_at = Utc::now();
    let chain = chains.create(
        &access,
        ChainCreate {
            account_id: content.account_id,
            kind: ChainType::Production,
            name: "Demo".into(),
            start_at,
            stop_at: Some(start_at + Duration::seconds(args.length_seconds)),
            embed_key: Some("demo".into()),
        },
    )?;
    store.put_chain_binding(ChainBinding {
        id: uuid::Uuid::new_v4(),
        chain_id: chain.id,
        target: BindingTarget::Library,
        target_id: content.library_id,
    })?;
    chains.update_state(&access, chain.id, ChainState::Ready)?;
    chains.update_state(&access, chain.id, ChainState::Fabricate)?;
    info!(chain = %chain.id, embed_key = "demo", "chain fabricating");

    // Schedule far ahead so the demo runs to completion in one pass
    let horizon = start_at + Duration::days(1);

    let mut built = 0u32;
    while built < args.segments {
        let chain = chains.read(&access, chain.id)?;
        let template = match chains.build_next_segment_or_complete(&access, &chain, horizon, horizon)? {
            SchedulingDecision::BuildSegment(template) => template,
            SchedulingDecision::NoAction => break,
        };

        let mut segment = segments.create(&access, template)?;
        segment.state = SegmentState::Crafting;
        let segment = segments.update(&access, segment)?;

        let random = match args.seed {
            Some(seed) => RandomSource::seeded(seed.wrapping_add(u64::from(segment.offset))),
            None => RandomSource::from_entropy(),
        };
        let mut fabricator = Fabricator::new(
            store.clone(),
            catalog.clone(),
            &config,
            chain.clone(),
            segment.clone(),
            random,
        )?;
        fabricator.craft()?;
        fabricator.done()?;

        let mut crafted = segments.read(&access, segment.id)?;
        info!(
            offset = crafted.offset,
            kind = ?crafted.kind,
            key = %crafted.key,
            total = crafted.total,
            tempo = crafted.tempo,
            "segment crafted"
        );

        // Dubbing is out of scope here; walk the lifecycle to Dubbed so
        // the scheduler can advance
        crafted.state = SegmentState::Dubbing;
        let mut dubbed = segments.update(&access, crafted)?;
        dubbed.state = SegmentState::Dubbed;
        segments.update(&access, dubbed)?;
        built += 1;
    }

    let chain = chains.read(&access, chain.id)?;
    info!(
        chain = %chain.id,
        state = %chain.state,
        segments = built,
        "work loop finished"
    );
    while let Ok(notification) = notifications.try_recv() {
        info!(?notification, "notification");
    }
    Ok(())
}
