//! One-time rewrite of legacy subscriber records.
//!
//! The first layout stored only `hour:minute`. The current layout is a
//! JSON record that also carries contacts. [`migrate`] runs before the
//! first load after an upgrade: it rewrites every legacy value, then
//! writes the schema version marker. Records already in the current
//! layout are left untouched, so an interrupted migration can simply be
//! run again.

use tracing::{info, info_span, Instrument};

use crate::models::SubscriberRecord;
use crate::Result;

use super::record_store::{RecordStore, SCHEMA_VERSION_KEY, SUBSCRIBER_PREFIX};

/// Version written once every record is in the current layout.
pub const CURRENT_SCHEMA_VERSION: &str = "1";

/// Rewrite legacy records if the schema marker is absent.
///
/// Returns how many records were rewritten.
///
/// # Errors
///
/// Returns `AppError::Db` if the store is unreachable or a record is in
/// neither layout. The marker is not written in that case.
pub async fn migrate(store: &dyn RecordStore) -> Result<usize> {
    rewrite_legacy(store).instrument(info_span!("migrate")).await
}

async fn rewrite_legacy(store: &dyn RecordStore) -> Result<usize> {
    if let Some(version) = store.get(SCHEMA_VERSION_KEY).await? {
        info!(%version, "schema version present; no migration needed");
        return Ok(0);
    }

    let mut rewritten = 0usize;
    for (key, value) in store.list_all().await? {
        let Some(id) = key.strip_prefix(SUBSCRIBER_PREFIX) else {
            continue;
        };
        if SubscriberRecord::decode(&value).is_ok() {
            continue;
        }
        let record = SubscriberRecord::decode_legacy(id, &value)?;
        store.set(&key, &record.encode()?).await?;
        rewritten += 1;
    }

    store.set(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION).await?;
    info!(rewritten, "legacy subscriber records migrated");
    Ok(rewritten)
}
