use super::error::ApiError;
use super::resource::{ListMode, Resource, ResourceClient};
use super::types::{
  Category, CategoryFilters, CategoryStats, CreateCategoryRequest, UpdateCategoryRequest,
};
use crate::cache::EntityKind;

pub struct Categories;

impl Resource for Categories {
  type Entity = Category;
  type Create = CreateCategoryRequest;
  type Update = UpdateCategoryRequest;
  type Filters = CategoryFilters;

  const KIND: EntityKind = EntityKind::Category;
  const BASE_PATH: &'static str = "/categories";
  const ALL_PATH: &'static str = "/categories/all";
  const SINGULAR: &'static str = "category";
  const PLURAL: &'static str = "categories";
  const LIST_MODE: ListMode = ListMode::Server;
}

impl ResourceClient<Categories> {
  /// Categories nested under their parents.
  pub async fn tree(&self) -> Result<Vec<Category>, ApiError> {
    Ok(self.gateway().get(&self.path("tree"), &()).await?.data)
  }

  pub async fn stats(&self, id: u64) -> Result<CategoryStats, ApiError> {
    Ok(
      self
        .gateway()
        .get(&self.path(format!("{}/stats", id)), &())
        .await?
        .data,
    )
  }
}
