//! Domain DTOs for the EcoMarket API.
//!
//! # Design
//! Field names on the wire are Spanish (`nombre`, `precio`, ...) and are kept
//! verbatim, so the structs need no serde renames. The types are defined
//! independently from the mock-server crate; integration tests catch schema
//! drift between the two.

use serde::{Deserialize, Serialize};

/// Producer of a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Producer {
    pub id: u64,
    pub nombre: String,
}

/// A product returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: u64,
    pub nombre: String,
    pub precio: f64,
    pub categoria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disponible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productor: Option<Producer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creado_en: Option<String>,
}

/// Payload for creating (POST) or fully replacing (PUT) a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProduct {
    pub nombre: String,
    pub precio: f64,
    pub categoria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disponible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

/// Payload for a partial (PATCH) update. Omitted fields stay unchanged on
/// the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disponible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

/// Profile of the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: u64,
    pub nombre: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub mensaje: String,
    #[serde(default)]
    pub leida: bool,
}

/// Optional filters for `GET /productos`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub categoria: Option<String>,
    pub orden: Option<String>,
}

impl ProductFilter {
    pub fn by_category(categoria: impl Into<String>) -> Self {
        Self {
            categoria: Some(categoria.into()),
            orden: None,
        }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        if let Some(categoria) = self.categoria.as_deref() {
            pairs.push(("categoria", categoria));
        }
        if let Some(orden) = self.orden.as_deref() {
            pairs.push(("orden", orden));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_optional_fields_default_to_none() {
        let product: Product = serde_json::from_str(
            r#"{"id":1,"nombre":"Miel","precio":80.0,"categoria":"miel"}"#,
        )
        .unwrap();
        assert_eq!(product.id, 1);
        assert!(product.productor.is_none());
        assert!(product.stock.is_none());
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = ProductPatch {
            precio: Some(12.5),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"precio": 12.5}));
    }

    #[test]
    fn filter_emits_pairs_in_stable_order() {
        let filter = ProductFilter {
            categoria: Some("frutas".to_string()),
            orden: Some("precio".to_string()),
        };
        assert_eq!(
            filter.query_pairs(),
            vec![("categoria", "frutas"), ("orden", "precio")]
        );
        assert!(ProductFilter::default().query_pairs().is_empty());
    }
}
