use crate::storage::{GENES_INDEX, VARIANTS_INDEX};
use crate::types::ServiceInfo;
use axum::Json;

pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        id: "org.example.vardex".to_string(),
        name: "vardex".to_string(),
        description: Some("Variant ingestion and search service for VCF and GTF files".to_string()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexes: vec![VARIANTS_INDEX.to_string(), GENES_INDEX.to_string()],
    })
}
