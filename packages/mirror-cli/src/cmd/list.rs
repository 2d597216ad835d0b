use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use mirror_core::catalog::{Catalog, ListFilter};
use mirror_core::{MirrorConfig, SqliteStore};

use crate::render::{self, OutputFormat};

#[derive(Args)]
pub struct ListArgs {
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Mirrors per page
    #[arg(long = "page-size", default_value_t = mirror_core::DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Comma-separated fields: id, date, changelog, dir, url
    #[arg(long, value_delimiter = ',')]
    pub fields: Option<Vec<String>>,
}

pub async fn run(args: ListArgs, config: &MirrorConfig) -> Result<()> {
    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    let filter = ListFilter::default()
        .page(args.page)
        .page_size(args.page_size);
    let mirrors = store.list(&filter).await?;

    let fields = args.fields.unwrap_or_else(|| {
        vec![
            "date".to_string(),
            "changelog".to_string(),
            "dir".to_string(),
        ]
    });
    render::print(&mirrors, &fields, args.format)
}
