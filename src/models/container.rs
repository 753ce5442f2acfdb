//! Domain models for the returnable-container ("casco") catalog.
//!
//! A container group collects products that share interchangeable return
//! packaging. There is no product→group index server-side; the catalog
//! lookup scans groups and their member lists.

use serde::{Deserialize, Serialize};

/// A named collection of products sharing interchangeable cascos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerGroup {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "descricao", default)]
    pub description: Option<String>,
}

/// A product listed as a member of a group. The backend populates either
/// `id` or `produto_id` depending on the endpoint revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawGroupProduct")]
pub struct GroupProduct {
    pub product_id: Option<i64>,
    pub name: String,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGroupProduct {
    id: Option<i64>,
    produto_id: Option<i64>,
    nome: Option<String>,
    produto_nome: Option<String>,
    categoria: Option<String>,
}

impl From<RawGroupProduct> for GroupProduct {
    fn from(raw: RawGroupProduct) -> Self {
        GroupProduct {
            product_id: raw.id.or(raw.produto_id),
            name: raw.nome.or(raw.produto_nome).unwrap_or_default(),
            category: raw.categoria,
        }
    }
}

impl GroupProduct {
    /// Match against a product id regardless of which raw field carried it.
    pub fn matches(&self, product_id: i64) -> bool {
        self.product_id == Some(product_id)
    }
}

/// Member-product detail for one group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupDetail {
    #[serde(rename = "produtos", default)]
    pub products: Vec<GroupProduct>,
}

/// A specific returnable-container variant available within a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawContainerOption")]
pub struct ContainerOption {
    pub id: i64,
    pub name: String,
    pub group_id: Option<i64>,
    pub group_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContainerOption {
    id: Option<i64>,
    produto_id: Option<i64>,
    nome: Option<String>,
    produto_nome: Option<String>,
    grupo_id: Option<i64>,
    grupo_nome: Option<String>,
}

impl From<RawContainerOption> for ContainerOption {
    fn from(raw: RawContainerOption) -> Self {
        ContainerOption {
            id: raw.id.or(raw.produto_id).unwrap_or(0),
            name: raw.nome.or(raw.produto_nome).unwrap_or_default(),
            group_id: raw.grupo_id,
            group_name: raw.grupo_nome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_product_dual_id_fields() {
        let a: GroupProduct =
            serde_json::from_str(r#"{"id": 5, "nome": "Botija P13"}"#).unwrap();
        let b: GroupProduct =
            serde_json::from_str(r#"{"produto_id": 5, "produto_nome": "Botija P13"}"#).unwrap();
        assert!(a.matches(5));
        assert!(b.matches(5));
        assert_eq!(a.name, b.name);
        assert!(!a.matches(6));
    }

    #[test]
    fn test_group_product_without_id_matches_nothing() {
        let p: GroupProduct = serde_json::from_str(r#"{"nome": "Avulso"}"#).unwrap();
        assert!(!p.matches(0));
        assert!(!p.matches(1));
    }

    #[test]
    fn test_container_option_normalization() {
        let opt: ContainerOption = serde_json::from_str(
            r#"{"produto_id": 31, "produto_nome": "Casco P13", "grupo_id": 2, "grupo_nome": "P13"}"#,
        )
        .unwrap();
        assert_eq!(opt.id, 31);
        assert_eq!(opt.name, "Casco P13");
        assert_eq!(opt.group_id, Some(2));
    }

    #[test]
    fn test_group_detail_missing_products() {
        let detail: GroupDetail = serde_json::from_str(r#"{}"#).unwrap();
        assert!(detail.products.is_empty());
    }
}
