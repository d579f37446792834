use common::Variant;

/// Sort variants ascending by area.
///
/// The sort is stable, so equal-area variants keep their input order.
pub fn sort_by_area(variants: &mut [Variant]) {
    variants.sort_by_key(Variant::area);
}

/// Sort `variants` and return the URL of the largest one.
///
/// Returns `None` for an empty list; callers drop the entry in that case.
pub fn select_primary(variants: &mut [Variant]) -> Option<String> {
    sort_by_area(variants);
    variants.last().map(|v| v.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_largest_area() {
        let mut variants = vec![
            Variant::new("a", 100, 100),
            Variant::new("b", 50, 50),
            Variant::new("c", 200, 100),
        ];
        assert_eq!(select_primary(&mut variants).as_deref(), Some("c"));
        let order: Vec<&str> = variants.iter().map(|v| v.url.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_equal_area_keeps_list_order() {
        let mut variants = vec![Variant::new("first", 100, 200), Variant::new("second", 200, 100)];
        assert_eq!(select_primary(&mut variants).as_deref(), Some("second"));
    }

    #[test]
    fn test_empty_has_no_primary() {
        let mut variants: Vec<Variant> = Vec::new();
        assert!(select_primary(&mut variants).is_none());
    }
}
