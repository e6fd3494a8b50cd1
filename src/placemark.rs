use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A resolved street address. Every part is optional because resolvers
/// rarely know all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placemark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_thoroughfare: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoroughfare: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrative_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Placemark {
    /// Street on the first line, locality/area/postcode on the second
    pub fn two_line(&self) -> String {
        let line1 = join_present(&[&self.sub_thoroughfare, &self.thoroughfare], " ");
        let line2 = join_present(
            &[&self.locality, &self.administrative_area, &self.postal_code],
            " ",
        );
        format!("{line1}\n{line2}")
    }

    /// `12 Main St, Springfield, IL 62701, United States`
    pub fn single_line(&self) -> String {
        let street = join_present(&[&self.sub_thoroughfare, &self.thoroughfare], " ");
        let region = join_present(&[&self.administrative_area, &self.postal_code], " ");
        let locality = self.locality.clone().unwrap_or_default();
        let country = self.country.clone().unwrap_or_default();

        [street, locality, region, country]
            .into_iter()
            .filter(|part| !part.is_empty())
            .join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self == &Placemark::default()
    }
}

fn join_present(parts: &[&Option<String>], sep: &str) -> String {
    parts
        .iter()
        .filter_map(|p| p.as_deref())
        .filter(|p| !p.trim().is_empty())
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Placemark {
        Placemark {
            sub_thoroughfare: Some("1".into()),
            thoroughfare: Some("Infinite Loop".into()),
            locality: Some("Cupertino".into()),
            administrative_area: Some("CA".into()),
            postal_code: Some("95014".into()),
            country: Some("United States".into()),
        }
    }

    #[test]
    fn two_line_full() {
        assert_eq!(full().two_line(), "1 Infinite Loop\nCupertino CA 95014");
    }

    #[test]
    fn single_line_full() {
        assert_eq!(
            full().single_line(),
            "1 Infinite Loop, Cupertino, CA 95014, United States"
        );
    }

    #[test]
    fn missing_parts_drop_their_separators() {
        let pm = Placemark {
            thoroughfare: Some("Market St".into()),
            postal_code: Some("94103".into()),
            country: Some("United States".into()),
            ..Default::default()
        };
        assert_eq!(pm.two_line(), "Market St\n94103");
        assert_eq!(pm.single_line(), "Market St, 94103, United States");
    }

    #[test]
    fn empty_placemark() {
        let pm = Placemark::default();
        assert!(pm.is_empty());
        assert_eq!(pm.two_line(), "\n");
        assert_eq!(pm.single_line(), "");
    }
}
