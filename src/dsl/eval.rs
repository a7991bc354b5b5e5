//! Evaluator for compiled filter trees.

use super::ast::{Comparator, FilterTree, Predicate, parse_number};
use crate::model::TagMap;

/// Evaluate a filter tree against a set of tags. Pure: the result depends
/// only on the tree and the tags.
pub fn evaluate_filter(tree: &FilterTree, tags: &TagMap) -> bool {
    match tree {
        FilterTree::Or(children) => children.iter().any(|c| evaluate_filter(c, tags)),
        FilterTree::And(children) => children.iter().all(|c| evaluate_filter(c, tags)),
        FilterTree::Sub(inner) => evaluate_filter(inner, tags),
        FilterTree::Simple(predicate) => {
            evaluate_predicate(predicate, tags.get(&predicate.identifier))
        }
    }
}

fn evaluate_predicate(predicate: &Predicate, value: Option<&str>) -> bool {
    match predicate.comparator {
        Comparator::Equal => value == Some(predicate.literal.as_str()),
        // A missing tag is not equal to anything.
        Comparator::NotEqual => value != Some(predicate.literal.as_str()),
        Comparator::Like => match (predicate.pattern(), value) {
            (Some(pattern), Some(actual)) => pattern.is_match(actual),
            _ => false,
        },
        Comparator::LessThan
        | Comparator::LessThanOrEqual
        | Comparator::GreaterThan
        | Comparator::GreaterThanOrEqual => {
            let Some(expected) = predicate.number() else {
                return false;
            };
            match value.and_then(parse_number) {
                Some(actual) => compare(predicate.comparator, actual, expected),
                None => false,
            }
        }
    }
}

fn compare(comparator: Comparator, actual: f64, expected: f64) -> bool {
    match comparator {
        Comparator::LessThan => actual < expected,
        Comparator::LessThanOrEqual => actual <= expected,
        Comparator::GreaterThan => actual > expected,
        Comparator::GreaterThanOrEqual => actual >= expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse_filter;

    fn make_tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn check(source: &str, tags: &[(&str, &str)]) -> bool {
        let tree = parse_filter(source).unwrap();
        evaluate_filter(&tree, &make_tags(tags))
    }

    #[test]
    fn test_equality() {
        assert!(check("city = 'Paris'", &[("city", "Paris")]));
        assert!(!check("city = 'Paris'", &[("city", "paris")]));
        assert!(!check("city = 'Paris'", &[]));
    }

    #[test]
    fn test_not_equal() {
        assert!(check("city <> 'Paris'", &[("city", "Lyon")]));
        assert!(!check("city <> 'Paris'", &[("city", "Paris")]));
        assert!(check("city <> 'Paris'", &[]));
    }

    #[test]
    fn test_literal_first_matches_identifier_first() {
        let tags = [("city", "Paris")];
        assert_eq!(check("'Paris' = city", &tags), check("city = 'Paris'", &tags));
        assert!(check("'Paris' = city", &tags));
    }

    #[test]
    fn test_like_prefix() {
        assert!(check("name LIKE 'San%'", &[("name", "San Jose")]));
        assert!(check("name LIKE 'San%'", &[("name", "san francisco")]));
        assert!(!check("name LIKE 'San%'", &[("name", "new san")]));
        assert!(!check("name LIKE 'San%'", &[("name", "NewSan")]));
        assert!(!check("name LIKE 'San%'", &[]));
    }

    #[test]
    fn test_like_single_char_and_dots() {
        assert!(check("ref LIKE 'A?1'", &[("ref", "AB1")]));
        assert!(!check("ref LIKE 'A?1'", &[("ref", "ABC1")]));
        assert!(check("v LIKE '1.%'", &[("v", "1.5")]));
        assert!(!check("v LIKE '1.%'", &[("v", "105")]));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(check("age<=5", &[("age", "5")]));
        assert!(check("age<=5", &[("age", "4.5")]));
        assert!(!check("age<=5", &[("age", "6")]));
        assert!(check("lanes > '2'", &[("lanes", "3")]));
        assert!(!check("lanes > '2'", &[("lanes", "2")]));
        assert!(check("lanes >= '2'", &[("lanes", "2")]));
        assert!(check("lanes < '2'", &[("lanes", "1")]));
    }

    #[test]
    fn test_numeric_comparison_non_numeric_is_false() {
        assert!(!check("age < 'ten'", &[("age", "5")]));
        assert!(!check("age < '10'", &[("age", "five")]));
        assert!(!check("age < '10'", &[]));
        assert!(!check("age >= '10'", &[("age", "")]));
    }

    #[test]
    fn test_boolean_composition() {
        let source = "(amenity = 'cafe' OR amenity = 'bar') AND name LIKE '%blue%'";
        assert!(check(source, &[("amenity", "bar"), ("name", "The Blue Door")]));
        assert!(!check(source, &[("amenity", "pub"), ("name", "Blue")]));
        assert!(!check(source, &[("amenity", "cafe"), ("name", "Red")]));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let tree = parse_filter("a = '1' OR b LIKE 'x%' AND c > '2'").unwrap();
        let tags = make_tags(&[("b", "xyz"), ("c", "3")]);
        let first = evaluate_filter(&tree, &tags);
        for _ in 0..10 {
            assert_eq!(evaluate_filter(&tree, &tags), first);
        }
        assert!(first);
    }

    #[test]
    fn test_round_trip_is_behaviorally_equal() {
        let sources = [
            "a = '1' OR b LIKE 'x%' AND c > '2'",
            "'v' = a",
            "(a <> '1') AND (c <= 4)",
        ];
        let inputs = [
            make_tags(&[]),
            make_tags(&[("a", "1")]),
            make_tags(&[("a", "v"), ("c", "4")]),
            make_tags(&[("b", "XY"), ("c", "9")]),
        ];
        for source in sources {
            let tree = parse_filter(source).unwrap();
            let reparsed = parse_filter(&tree.to_string()).unwrap();
            for tags in &inputs {
                assert_eq!(evaluate_filter(&tree, tags), evaluate_filter(&reparsed, tags));
            }
        }
    }
}
