//! Recipe resolution
//!
//! Recipes map a sellable product onto inventory ingredients. The resolver
//! answers two questions: how much raw material does serving N portions
//! consume, and what does one portion cost at current average prices.

use chrono::Utc;
use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::models::{IngredientDemand, Recipe, RecipeIngredient};

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::Store;

/// Recipe resolver over the shared store
#[derive(Clone)]
pub struct RecipeResolver {
    store: Store,
    config: CoreConfig,
}

impl RecipeResolver {
    pub fn new(store: Store, config: CoreConfig) -> Self {
        Self { store, config }
    }

    /// Create or replace the recipe for a product
    pub fn set_recipe(&self, recipe: Recipe) -> CoreResult<Recipe> {
        if recipe.product_id.trim().is_empty() {
            return Err(CoreError::validation("recipe product_id cannot be empty"));
        }
        if recipe.servings == 0 {
            return Err(CoreError::validation("recipe servings must be positive"));
        }
        if recipe.ingredients.is_empty() {
            return Err(CoreError::validation("recipe must have at least one ingredient"));
        }
        for ingredient in &recipe.ingredients {
            if ingredient.quantity_per_serving <= Decimal::ZERO {
                return Err(CoreError::validation(format!(
                    "ingredient {} quantity must be positive",
                    ingredient.inventory_item_id
                )));
            }
        }

        let mut recipe = recipe;
        recipe.ingredients.sort_by_key(|i| i.step);
        recipe.updated_at = Utc::now();

        self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| {
                self.store.put_recipe(txn, &recipe)?;
                Ok(())
            },
        )?;

        tracing::info!(product_id = %recipe.product_id, ingredients = recipe.ingredients.len(), "Recipe stored");
        Ok(recipe)
    }

    pub fn get_recipe(&self, product_id: &str) -> CoreResult<Option<Recipe>> {
        Ok(self.store.get_recipe(product_id)?)
    }

    pub fn clear_recipe(&self, product_id: &str) -> CoreResult<()> {
        self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| {
                self.store.delete_recipe(txn, product_id)?;
                Ok(())
            },
        )
    }

    /// Raw-material demand for serving `quantity` portions of a product.
    ///
    /// A product without a recipe is "not stock tracked": the demand is
    /// empty unless the engine is configured to require recipes, in which
    /// case it is a validation error.
    pub fn ingredient_demand(
        &self,
        product_id: &str,
        quantity: Decimal,
    ) -> CoreResult<Vec<IngredientDemand>> {
        let recipe = self.store.get_recipe(product_id)?;
        self.demand_from(recipe, product_id, quantity)
    }

    /// Same as [`ingredient_demand`](Self::ingredient_demand), evaluated
    /// inside the caller's transaction so the recipe read and the stock
    /// deductions it drives see one consistent state.
    pub fn ingredient_demand_in(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
        quantity: Decimal,
    ) -> CoreResult<Vec<IngredientDemand>> {
        let recipe = self.store.get_recipe_in(txn, product_id)?;
        self.demand_from(recipe, product_id, quantity)
    }

    fn demand_from(
        &self,
        recipe: Option<Recipe>,
        product_id: &str,
        quantity: Decimal,
    ) -> CoreResult<Vec<IngredientDemand>> {
        if quantity <= Decimal::ZERO {
            return Err(CoreError::validation("demand quantity must be positive"));
        }

        let Some(recipe) = recipe else {
            if self.config.require_recipe {
                return Err(CoreError::validation(format!(
                    "no recipe defined for product {product_id}"
                )));
            }
            tracing::debug!(product_id, "No recipe; product is not stock tracked");
            return Ok(Vec::new());
        };

        Ok(recipe
            .ingredients
            .iter()
            .map(|i| IngredientDemand {
                inventory_item_id: i.inventory_item_id.clone(),
                quantity: i.quantity_per_serving * quantity,
                unit: i.unit,
                is_optional: i.is_optional,
            })
            .collect())
    }

    /// Ingredient cost of a single serving at current average costs.
    ///
    /// Ingredients are converted into each inventory item's unit before
    /// pricing; an ingredient whose unit cannot be converted is a
    /// validation error rather than a silent zero.
    pub fn cost_per_serving(&self, product_id: &str) -> CoreResult<Decimal> {
        let recipe = self
            .store
            .get_recipe(product_id)?
            .ok_or_else(|| CoreError::not_found("recipe", product_id))?;

        let mut batch_cost = Decimal::ZERO;
        for ingredient in &recipe.ingredients {
            batch_cost += self.ingredient_cost(ingredient)?;
        }
        Ok((batch_cost / Decimal::from(recipe.servings)).round_dp(4))
    }

    fn ingredient_cost(&self, ingredient: &RecipeIngredient) -> CoreResult<Decimal> {
        let item = self
            .store
            .get_inventory_item(&ingredient.inventory_item_id)?
            .ok_or_else(|| CoreError::not_found("inventory item", &ingredient.inventory_item_id))?;

        let quantity = ingredient
            .unit
            .convert(ingredient.quantity_per_serving, item.unit)
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "recipe unit {} is incompatible with item {} unit {}",
                    ingredient.unit, item.id, item.unit
                ))
            })?;
        Ok(quantity * item.average_cost)
    }
}
