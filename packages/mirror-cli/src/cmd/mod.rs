pub mod create;
pub mod delete_expired;
pub mod list;
pub mod run;

use std::sync::Arc;

use anyhow::Result;
use mirror_core::{MirrorConfig, MirrorService, SqliteStore, WgetTool};

/// Wire the service against the configured sqlite store and the real
/// wget tool. An object-store backend would be injected here.
pub(crate) async fn build_service(
    config: &MirrorConfig,
) -> Result<(Arc<MirrorService>, Arc<SqliteStore>)> {
    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    let tool = Arc::new(WgetTool::new(&config.wget_binary));
    let service = MirrorService::new(config.clone(), store.clone(), store.clone(), tool, None);
    Ok((Arc::new(service), store))
}
