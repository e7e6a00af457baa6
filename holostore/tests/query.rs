mod common;

use std::sync::Arc;

use common::{ADDR_A, ADDR_B, ADDR_C, address, init_test_context};
use holostore::errors::CacheError;
use holostore::models::{CredentialService, Holo};
use holostore::sanitize::FieldUpdate;

#[tokio::test]
async fn search_matches_any_field_case_insensitively() -> anyhow::Result<()> {
    let ctx = init_test_context()?;
    let store = &ctx.cache.store;
    store.upsert(
        &ctx.chain("gnosis"),
        &address(ADDR_A),
        &FieldUpdate::full(Holo {
            bio: Some("physicist".to_string()),
            ..Holo::default()
        }),
    )?;
    store.upsert(
        &ctx.chain("mumbai"),
        &address(ADDR_B),
        &FieldUpdate::full(Holo {
            name: Some("Phys Society".to_string()),
            ..Holo::default()
        }),
    )?;
    // Matches on both chains; must still be reported once.
    for chain in ["gnosis", "mumbai"] {
        store.upsert(
            &ctx.chain(chain),
            &address(ADDR_C),
            &FieldUpdate::full(Holo {
                github: Some("PHYSICS-fan".to_string()),
                ..Holo::default()
            }),
        )?;
    }

    let matches = ctx.cache.query.find_records_matching_text("phys")?;
    let mut found: Vec<_> = matches.iter().map(|m| m.address.clone()).collect();
    found.sort();
    assert_eq!(found, vec![address(ADDR_A), address(ADDR_B), address(ADDR_C)]);

    let c = matches.iter().find(|m| m.address == address(ADDR_C)).unwrap();
    assert_eq!(c.chains.len(), 2);

    assert!(ctx.cache.query.find_records_matching_text("chemist")?.is_empty());
    Ok(())
}

#[tokio::test]
async fn lookups_validate_input_before_touching_storage() -> anyhow::Result<()> {
    let ctx = init_test_context()?;
    let query = &ctx.cache.query;

    assert!(matches!(query.get_record("gnosis", "0x12"), Err(CacheError::InvalidInput(_))));
    assert!(matches!(
        query.get_record("no such chain", ADDR_A),
        Err(CacheError::InvalidInput(_))
    ));
    assert!(query.get_record("gnosis", ADDR_A)?.is_none());

    assert!(matches!(
        query.address_for_credentials("myspace", "ada").await,
        Err(CacheError::InvalidInput(_))
    ));
    assert!(matches!(
        query.address_for_credentials("google", "ada lovelace").await,
        Err(CacheError::InvalidInput(_))
    ));
    Ok(())
}

#[tokio::test]
async fn credential_lookup_prefers_cache_then_chain() -> anyhow::Result<()> {
    let ctx = init_test_context()?;
    ctx.cache.store.upsert(
        &ctx.chain("gnosis"),
        &address(ADDR_A),
        &FieldUpdate::credential(CredentialService::Google, Some("ada@example.com")),
    )?;
    ctx.registry.set_credential(ADDR_B, CredentialService::Google, "bob@example.com");

    let query = &ctx.cache.query;
    assert_eq!(
        query.address_for_credentials("google", "ada@example.com").await?,
        Some(address(ADDR_A))
    );
    assert_eq!(
        query.address_for_credentials("google", "bob@example.com").await?,
        Some(address(ADDR_B))
    );
    assert_eq!(query.address_for_credentials("google", "eve@example.com").await?, None);
    Ok(())
}

#[tokio::test]
async fn all_addresses_lists_each_address_once() -> anyhow::Result<()> {
    let ctx = init_test_context()?;
    let update = FieldUpdate::credential(CredentialService::Discord, Some("ada#1"));
    ctx.cache.store.upsert(&ctx.chain("gnosis"), &address(ADDR_A), &update)?;
    ctx.cache.store.upsert(&ctx.chain("mumbai"), &address(ADDR_A), &update)?;

    let all = ctx.cache.query.all_addresses_with_any_record()?;
    assert_eq!(all.len(), 1);
    assert!(all.contains(&address(ADDR_A)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_leave_exactly_one_row() -> anyhow::Result<()> {
    let ctx = init_test_context()?;
    let gnosis = ctx.chain("gnosis");
    let store = Arc::clone(&ctx.cache.store);

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        let gnosis = gnosis.clone();
        handles.push(tokio::spawn(async move {
            let update = FieldUpdate::full(Holo {
                name: Some(format!("writer-{i}")),
                ..Holo::default()
            });
            store.upsert(&gnosis, &address(ADDR_A), &update)
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let records = store.get_all(&gnosis)?;
    assert_eq!(records.len(), 1);
    let name = records[0].holo.name.clone().unwrap();
    assert!(name.starts_with("writer-"));

    // The survivor is whichever write landed last; a final write must win.
    store.upsert(
        &gnosis,
        &address(ADDR_A),
        &FieldUpdate::full(Holo {
            name: Some("final".to_string()),
            ..Holo::default()
        }),
    )?;
    let record = store.get(&gnosis, &address(ADDR_A))?.unwrap();
    assert_eq!(record.holo.name.as_deref(), Some("final"));
    Ok(())
}
