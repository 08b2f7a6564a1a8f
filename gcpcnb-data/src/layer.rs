use crate::newtypes::cnb_newtype;

cnb_newtype!(
    /// The name of a layer.
    ///
    /// It can contain all characters supported by the filesystem except `/`, but MUST NOT be
    /// `build`, `launch` or `store`, since those names collide with the files the lifecycle
    /// reads from a buildpack's layers directory.
    ///
    /// # Examples
    /// ```
    /// use gcpcnb_data::layer::LayerName;
    ///
    /// let name: LayerName = "sdk".parse().unwrap();
    /// assert_eq!(name.as_str(), "sdk");
    ///
    /// assert!("launch".parse::<LayerName>().is_err());
    /// assert!("a/b".parse::<LayerName>().is_err());
    /// ```
    LayerName,
    LayerNameError,
    r"^(?!(build|launch|store)$)[^/]+$"
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn layer_name_rejects_reserved_names() {
        for reserved in ["build", "launch", "store"] {
            assert!(LayerName::from_str(reserved).is_err());
        }
    }

    #[test]
    fn layer_name_allows_reserved_prefixes() {
        assert!(LayerName::from_str("build-cache").is_ok());
        assert!(LayerName::from_str("launcher").is_ok());
    }

    #[test]
    fn layer_name_rejects_empty_and_nested() {
        assert!(LayerName::from_str("").is_err());
        assert!(LayerName::from_str("../sdk").is_err());
    }
}
