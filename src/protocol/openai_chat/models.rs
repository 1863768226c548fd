use super::{ModelCard, ModelList};

/// Build the `/v1/models` listing: one card per configured model id, in
/// configuration order.
#[must_use]
pub fn build_model_list(models: &[String], owned_by: &str, created: u64) -> ModelList {
    ModelList {
        object: "list".to_string(),
        data: models
            .iter()
            .map(|id| ModelCard {
                id: id.clone(),
                object: "model".to_string(),
                created,
                owned_by: owned_by.to_string(),
            })
            .collect(),
    }
}
