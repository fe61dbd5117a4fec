//! FoodData Central nutrient lookup
//!
//! Queries the `foods/search` endpoint and keeps only the top-ranked food.

use async_trait::async_trait;
use serde::Deserialize;

use super::NutrientLookup;
use crate::error::CollabResult;
use crate::models::FoodRecord;

pub const DEFAULT_SEARCH_URL: &str = "https://api.nal.usda.gov/fdc/v1/foods/search";
pub const DEFAULT_DATA_TYPE: &str = "SR Legacy";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<FoodRecord>,
}

/// FoodData Central search client
#[derive(Debug, Clone)]
pub struct FoodDataCentral {
    client: reqwest::Client,
    url: String,
    api_key: String,
    data_type: String,
}

impl FoodDataCentral {
    pub fn new(client: reqwest::Client, url: String, api_key: String, data_type: String) -> Self {
        Self {
            client,
            url,
            api_key,
            data_type,
        }
    }

    fn query_params<'a>(&'a self, query: &'a str) -> [(&'static str, &'a str); 7] {
        [
            ("dataType", self.data_type.as_str()),
            ("pageSize", "1"),
            ("pageNumber", "1"),
            ("sortBy", "dataType.keyword"),
            ("sortOrder", "asc"),
            ("api_key", self.api_key.as_str()),
            ("query", query),
        ]
    }
}

#[async_trait]
impl NutrientLookup for FoodDataCentral {
    async fn search(&self, query: &str) -> CollabResult<Option<FoodRecord>> {
        let query = query.trim().to_lowercase();
        let response = self
            .client
            .get(&self.url)
            .query(&self.query_params(&query))
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        top_food(&body)
    }
}

fn top_food(body: &str) -> CollabResult<Option<FoodRecord>> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response.foods.into_iter().next())
}
