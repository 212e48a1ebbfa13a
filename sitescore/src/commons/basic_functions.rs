use ndarray::ArrayView2;
use std::path::Path;

use crate::collect::global_variables::DEFAULT_PROJECT_NAME;

/// Share of `values` satisfying `predicate`, as a percentage in [0, 100]
/// Returns `None` when the view holds no pixels
pub fn percentage_where<T, F>(values: ArrayView2<'_, T>, predicate: F) -> Option<f64>
where
    F: Fn(&T) -> bool,
{
    let total = values.len();
    if total == 0 {
        return None;
    }
    let matching = values.iter().filter(|v| predicate(*v)).count();
    Some(matching as f64 / total as f64 * 100.0)
}

/// Project name derived from an area-of-interest filename: everything before
/// the first `_` of the file name, e.g. `cordoba_aoi.geojson` -> `cordoba`
pub fn project_name_from_filename<P: AsRef<Path>>(filename: P) -> String {
    filename
        .as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('_').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_percentage_where() {
        let values = array![[0u8, 1], [1, 1]];
        assert_eq!(percentage_where(values.view(), |v| *v == 1), Some(75.0));
        assert_eq!(percentage_where(values.view(), |v| *v > 5), Some(0.0));
    }

    #[test]
    fn test_percentage_where_empty() {
        let values: Array2<f64> = Array2::zeros((0, 4));
        assert_eq!(percentage_where(values.view(), |v| *v > 1.0), None);
    }

    #[test]
    fn test_project_name_from_filename() {
        assert_eq!(project_name_from_filename("data/cordoba_aoi.geojson"), "cordoba");
        assert_eq!(project_name_from_filename("field.geojson"), "field.geojson");
        assert_eq!(project_name_from_filename("_leading.geojson"), DEFAULT_PROJECT_NAME);
        assert_eq!(project_name_from_filename(""), DEFAULT_PROJECT_NAME);
    }
}
