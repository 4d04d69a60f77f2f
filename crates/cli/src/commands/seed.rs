//! Seed the catalog from a YAML file.
//!
//! The file is a list of products in the same shape the create-product
//! endpoint accepts:
//!
//! ```yaml
//! - name: Linen Shirt
//!   description: Relaxed fit, garment washed
//!   price: 249000
//!   category: Men
//!   subCategory: Topwear
//!   images:
//!     - https://cdn.example.com/linen-shirt.jpg
//!   sizes:
//!     - size: M
//!       quantity: 12
//!     - size: L
//!       quantity: 8
//! ```

use std::path::Path;

use tracing::{error, info};

use threadline_storefront::db::{self, PgProducts};
use threadline_storefront::models::NewProduct;
use threadline_storefront::services::CatalogService;

use super::database_url;

/// Insert every product in `file_path`.
///
/// The whole file is parsed before connecting. Products that fail catalog
/// validation are logged and skipped; the rest are inserted.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the database
/// is unreachable.
pub async fn products(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading products from file");
    let content = tokio::fs::read_to_string(path).await?;
    let products: Vec<NewProduct> = serde_yaml::from_str(&content)?;
    info!(products = products.len(), "Parsed catalog file");

    let pool = db::create_pool(&database_url()?).await?;
    info!("Connected to database");

    let repository = PgProducts::new(pool);
    let catalog = CatalogService::new(&repository);

    let mut inserted = 0_usize;
    let mut failed = 0_usize;
    for product in products {
        let name = product.name.clone();
        match catalog.create(product).await {
            Ok(created) => {
                inserted += 1;
                info!(id = %created.id, name = %created.name, "Inserted product");
            }
            Err(e) => {
                failed += 1;
                error!(name = %name, error = %e, "Skipped product");
            }
        }
    }

    info!("Seeding complete!");
    info!("  Products inserted: {inserted}");
    info!("  Products skipped: {failed}");

    Ok(())
}
