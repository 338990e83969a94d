use std::collections::HashSet;

use serde_json::Value;

use crate::{
    constants::{MAX_AMOUNT, MIN_AMOUNT, RECIPE_NAME_MAX_LENGTH},
    schema::Id,
};

use super::{
    error::RecipeError,
    form::{integer, Form},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i64,
}

/// A recipe mutation as submitted, before any business rule has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDraft {
    pub name: String,
    pub text: String,
    pub image: Option<String>,
    pub cooking_time: i64,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

impl RecipeDraft {
    /// Reads a draft out of a request body. An absent `tags` or `ingredients` key reads as an
    /// empty list so that it is reported by [`validate_recipe`] in rule order.
    pub fn from_form(form: &Form, require_image: bool) -> Result<Self, RecipeError> {
        let name = form.get_str("name")?;
        if name.chars().count() > RECIPE_NAME_MAX_LENGTH {
            return Err(RecipeError::OutOfRange(format!(
                "Name must be at most {RECIPE_NAME_MAX_LENGTH} characters"
            )));
        }

        let text = form.get_str("text")?;
        let image = match require_image {
            true => Some(form.get_str("image")?),
            false => form.get_optional_str("image")?,
        };
        let cooking_time = form.get_number("cooking_time")?;

        let tags = match form.get_raw("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| id(item, "tags"))
                .collect::<Result<Vec<Id>, RecipeError>>()?,
            Some(_) => return Err(RecipeError::InvalidField(String::from("'tags' must be a list"))),
            None => vec![],
        };

        let ingredients = match form.get_raw("ingredients") {
            Some(Value::Array(items)) => items
                .iter()
                .map(ingredient_amount)
                .collect::<Result<Vec<IngredientAmount>, RecipeError>>()?,
            Some(_) => {
                return Err(RecipeError::InvalidField(String::from(
                    "'ingredients' must be a list",
                )))
            }
            None => vec![],
        };

        Ok(Self {
            name,
            text,
            image,
            cooking_time,
            tags,
            ingredients,
        })
    }
}

fn id(value: &Value, field: &str) -> Result<Id, RecipeError> {
    integer(value)
        .and_then(|id| Id::try_from(id).ok())
        .ok_or_else(|| RecipeError::InvalidField(format!("'{field}' must contain identifiers")))
}

fn ingredient_amount(value: &Value) -> Result<IngredientAmount, RecipeError> {
    let entry = value.as_object().ok_or_else(|| {
        RecipeError::InvalidField(String::from("'ingredients' must contain objects"))
    })?;

    let ingredient = entry
        .get("id")
        .filter(|v| !v.is_null())
        .ok_or_else(|| RecipeError::missing("ingredients.id"))?;
    let amount = entry
        .get("amount")
        .filter(|v| !v.is_null())
        .ok_or_else(|| RecipeError::missing("ingredients.amount"))?;

    Ok(IngredientAmount {
        id: id(ingredient, "ingredients.id")?,
        amount: integer(amount).ok_or_else(|| {
            RecipeError::InvalidField(String::from("'ingredients.amount' must be an integer"))
        })?,
    })
}

/// The tags and ingredients that currently exist, restricted to those a draft references.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tags: HashSet<Id>,
    ingredients: HashSet<Id>,
}

impl Catalog {
    pub fn new(
        tags: impl IntoIterator<Item = Id>,
        ingredients: impl IntoIterator<Item = Id>,
    ) -> Self {
        Self {
            tags: tags.into_iter().collect(),
            ingredients: ingredients.into_iter().collect(),
        }
    }

    pub fn has_tag(&self, id: Id) -> bool {
        self.tags.contains(&id)
    }

    pub fn has_ingredient(&self, id: Id) -> bool {
        self.ingredients.contains(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeLine {
    pub ingredient_id: Id,
    pub amount: i32,
}

/// A draft that passed every rule; amounts are narrowed to their storage type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRecipe {
    pub name: String,
    pub text: String,
    pub image: Option<String>,
    pub cooking_time: i32,
    pub tags: Vec<Id>,
    pub ingredients: Vec<RecipeLine>,
}

fn in_range(value: i64) -> bool {
    (MIN_AMOUNT..=MAX_AMOUNT).contains(&value)
}

/// Checks a draft against the recipe rules in a fixed order; the first failure wins.
pub fn validate_recipe(draft: RecipeDraft, catalog: &Catalog) -> Result<ValidRecipe, RecipeError> {
    if !in_range(draft.cooking_time) {
        return Err(RecipeError::OutOfRange(format!(
            "Cooking time must be between {MIN_AMOUNT} and {MAX_AMOUNT}"
        )));
    }

    if draft.tags.is_empty() {
        return Err(RecipeError::MissingField(String::from(
            "At least one tag is required",
        )));
    }

    if draft.ingredients.is_empty() {
        return Err(RecipeError::MissingField(String::from(
            "At least one ingredient is required",
        )));
    }

    if let Some(part) = draft.ingredients.iter().find(|part| !in_range(part.amount)) {
        return Err(RecipeError::OutOfRange(format!(
            "Amount of ingredient {} must be between {MIN_AMOUNT} and {MAX_AMOUNT}",
            part.id
        )));
    }

    let mut seen = HashSet::new();
    if let Some(part) = draft.ingredients.iter().find(|part| !seen.insert(part.id)) {
        return Err(RecipeError::DuplicateEntry(format!(
            "Ingredient {} is listed more than once",
            part.id
        )));
    }

    let mut seen = HashSet::new();
    if let Some(tag) = draft.tags.iter().find(|tag| !seen.insert(**tag)) {
        return Err(RecipeError::DuplicateEntry(format!(
            "Tag {tag} is listed more than once"
        )));
    }

    if let Some(tag) = draft.tags.iter().find(|tag| !catalog.has_tag(**tag)) {
        return Err(RecipeError::ReferenceNotFound(format!("Tag {tag} doesn't exist")));
    }

    if let Some(part) = draft
        .ingredients
        .iter()
        .find(|part| !catalog.has_ingredient(part.id))
    {
        return Err(RecipeError::ReferenceNotFound(format!(
            "Ingredient {} doesn't exist",
            part.id
        )));
    }

    Ok(ValidRecipe {
        name: draft.name,
        text: draft.text,
        image: draft.image,
        // both bounded by MAX_AMOUNT above
        cooking_time: draft.cooking_time as i32,
        tags: draft.tags,
        ingredients: draft
            .ingredients
            .into_iter()
            .map(|part| RecipeLine {
                ingredient_id: part.id,
                amount: part.amount as i32,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn draft(cooking_time: i64, tags: Vec<Id>, ingredients: Vec<(Id, i64)>) -> RecipeDraft {
        RecipeDraft {
            name: String::from("Pancakes"),
            text: String::from("Mix and fry."),
            image: None,
            cooking_time,
            tags,
            ingredients: ingredients
                .into_iter()
                .map(|(id, amount)| IngredientAmount { id, amount })
                .collect(),
        }
    }

    fn catalog() -> Catalog {
        Catalog::new([1, 2, 3], [10, 11, 12])
    }

    #[test]
    fn accepts_valid_draft() {
        let valid = validate_recipe(draft(20, vec![2, 1], vec![(10, 3), (11, 200)]), &catalog())
            .unwrap();

        assert_eq!(valid.cooking_time, 20);
        assert_eq!(valid.tags, vec![2, 1]);
        assert_eq!(
            valid.ingredients,
            vec![
                RecipeLine { ingredient_id: 10, amount: 3 },
                RecipeLine { ingredient_id: 11, amount: 200 },
            ]
        );
    }

    #[test]
    fn lower_bounds_are_inclusive() {
        assert!(validate_recipe(draft(1, vec![1], vec![(10, 1)]), &catalog()).is_ok());
        assert!(validate_recipe(draft(MAX_AMOUNT, vec![1], vec![(10, MAX_AMOUNT)]), &catalog()).is_ok());
    }

    #[test]
    fn zero_cooking_time_is_out_of_range() {
        let result = validate_recipe(draft(0, vec![1], vec![(10, 1)]), &catalog());
        assert!(matches!(result, Err(RecipeError::OutOfRange(_))));
    }

    #[test]
    fn cooking_time_above_maximum_is_out_of_range() {
        let result = validate_recipe(draft(MAX_AMOUNT + 1, vec![1], vec![(10, 1)]), &catalog());
        assert!(matches!(result, Err(RecipeError::OutOfRange(_))));
    }

    #[test]
    fn zero_amount_is_out_of_range() {
        let result = validate_recipe(draft(10, vec![1], vec![(10, 2), (11, 0)]), &catalog());
        assert!(matches!(result, Err(RecipeError::OutOfRange(_))));
    }

    #[test]
    fn empty_tags_are_missing() {
        let result = validate_recipe(draft(10, vec![], vec![(10, 1)]), &catalog());
        assert!(matches!(result, Err(RecipeError::MissingField(_))));
    }

    #[test]
    fn empty_ingredients_are_missing() {
        let result = validate_recipe(draft(10, vec![1], vec![]), &catalog());
        assert!(matches!(result, Err(RecipeError::MissingField(_))));
    }

    #[test]
    fn duplicate_ingredients_fail_even_with_different_amounts() {
        let result = validate_recipe(draft(10, vec![1], vec![(10, 1), (10, 5)]), &catalog());
        assert!(matches!(result, Err(RecipeError::DuplicateEntry(_))));
    }

    #[test]
    fn duplicate_tags_fail() {
        let result = validate_recipe(draft(10, vec![1, 1], vec![(10, 1)]), &catalog());
        assert!(matches!(result, Err(RecipeError::DuplicateEntry(_))));
    }

    #[test]
    fn unknown_references_fail() {
        let tag = validate_recipe(draft(10, vec![1, 99], vec![(10, 1)]), &catalog());
        assert!(matches!(tag, Err(RecipeError::ReferenceNotFound(_))));

        let ingredient = validate_recipe(draft(10, vec![1], vec![(99, 1)]), &catalog());
        assert!(matches!(ingredient, Err(RecipeError::ReferenceNotFound(_))));
    }

    #[test]
    fn first_failing_rule_wins() {
        // out of range cooking time is reported before the empty tag list
        let result = validate_recipe(draft(0, vec![], vec![]), &catalog());
        assert!(matches!(result, Err(RecipeError::OutOfRange(_))));

        // duplicates are reported before unknown references
        let result = validate_recipe(draft(10, vec![98, 98], vec![(99, 1)]), &catalog());
        assert!(matches!(result, Err(RecipeError::DuplicateEntry(_))));
    }

    #[test]
    fn draft_from_form_reads_every_field() {
        let form = Form::from_data(
            serde_json::from_value(json!({
                "name": "Pancakes",
                "text": "Mix and fry.",
                "image": "data:image/png;base64,AAAA",
                "cooking_time": "15",
                "tags": [1, 2],
                "ingredients": [{ "id": 10, "amount": 3 }, { "id": "11", "amount": "4" }]
            }))
            .unwrap(),
        );

        let draft = RecipeDraft::from_form(&form, true).unwrap();

        assert_eq!(draft.cooking_time, 15);
        assert_eq!(draft.tags, vec![1, 2]);
        assert_eq!(
            draft.ingredients,
            vec![
                IngredientAmount { id: 10, amount: 3 },
                IngredientAmount { id: 11, amount: 4 },
            ]
        );
    }

    #[test]
    fn draft_without_lists_fails_validation_as_missing() {
        let form = Form::from_data(
            serde_json::from_value(json!({
                "name": "Pancakes",
                "text": "Mix and fry.",
                "cooking_time": 15
            }))
            .unwrap(),
        );

        let draft = RecipeDraft::from_form(&form, false).unwrap();
        let result = validate_recipe(draft, &catalog());

        assert!(matches!(result, Err(RecipeError::MissingField(_))));
    }

    #[test]
    fn draft_requires_image_on_create() {
        let form = Form::from_data(
            serde_json::from_value(json!({
                "name": "Pancakes",
                "text": "Mix and fry.",
                "cooking_time": 15,
                "tags": [1],
                "ingredients": [{ "id": 10, "amount": 3 }]
            }))
            .unwrap(),
        );

        assert!(matches!(
            RecipeDraft::from_form(&form, true),
            Err(RecipeError::MissingField(_))
        ));
    }

    #[test]
    fn ingredient_without_amount_is_missing() {
        let form = Form::from_data(
            serde_json::from_value(json!({
                "name": "Pancakes",
                "text": "Mix and fry.",
                "cooking_time": 15,
                "tags": [1],
                "ingredients": [{ "id": 10 }]
            }))
            .unwrap(),
        );

        assert!(matches!(
            RecipeDraft::from_form(&form, false),
            Err(RecipeError::MissingField(_))
        ));
    }
}
