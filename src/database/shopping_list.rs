use std::collections::BTreeMap;

use crate::{
    constants::SHOPPING_LIST_HEADER,
    schema::{CartLine, Id, ShoppingListItem},
};

/// Sums cart lines per ingredient.
///
/// Output is ordered by ingredient name, then by ingredient id when two ingredients share a
/// name (e.g. the same product measured in different units).
pub fn aggregate<I>(lines: I) -> Vec<ShoppingListItem>
where
    I: IntoIterator<Item = CartLine>,
{
    let mut totals: BTreeMap<Id, ShoppingListItem> = BTreeMap::new();

    for line in lines {
        totals
            .entry(line.ingredient_id)
            .and_modify(|item| item.total_amount += i64::from(line.amount))
            .or_insert_with(|| ShoppingListItem {
                ingredient_id: line.ingredient_id,
                total_amount: i64::from(line.amount),
                name: line.name,
                measurement_unit: line.measurement_unit,
            });
    }

    let mut items: Vec<ShoppingListItem> = totals.into_values().collect();
    items.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
    });
    items
}

/// Plain-text shopping list: a header, a blank line, then `name (unit) - total` per item.
pub fn render(items: &[ShoppingListItem]) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "{} ({}) - {}",
                item.name, item.measurement_unit, item.total_amount
            )
        })
        .collect();

    format!("{SHOPPING_LIST_HEADER}\n\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ingredient_id: Id, name: &str, unit: &str, amount: i32) -> CartLine {
        CartLine {
            ingredient_id,
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn sums_shared_ingredient_across_recipes() {
        let items = aggregate(vec![
            line(1, "flour", "g", 3),
            line(2, "egg", "pcs", 2),
            line(1, "flour", "g", 5),
        ]);

        assert_eq!(items.len(), 2);
        let flour = items.iter().find(|item| item.ingredient_id == 1).unwrap();
        assert_eq!(flour.total_amount, 8);
    }

    #[test]
    fn orders_by_name_then_id() {
        let items = aggregate(vec![
            line(7, "sugar", "g", 1),
            line(5, "milk", "ml", 1),
            line(3, "milk", "cup", 1),
        ]);

        let order: Vec<Id> = items.iter().map(|item| item.ingredient_id).collect();
        assert_eq!(order, vec![3, 5, 7]);
    }

    #[test]
    fn empty_cart_gives_empty_list() {
        assert!(aggregate(Vec::new()).is_empty());
        assert_eq!(render(&[]), format!("{SHOPPING_LIST_HEADER}\n\n"));
    }

    #[test]
    fn totals_do_not_overflow_storage_type() {
        let items = aggregate(vec![
            line(1, "water", "ml", i32::MAX),
            line(1, "water", "ml", i32::MAX),
        ]);

        assert_eq!(items[0].total_amount, 2 * i64::from(i32::MAX));
    }

    #[test]
    fn renders_one_line_per_item() {
        let items = aggregate(vec![line(1, "flour", "g", 3), line(2, "egg", "pcs", 2)]);

        assert_eq!(
            render(&items),
            format!("{SHOPPING_LIST_HEADER}\n\negg (pcs) - 2\nflour (g) - 3")
        );
    }
}
