use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::fix::Coordinate;
use crate::placemark::Placemark;
use crate::readout::{format_degrees, ADDRESS_NOT_FOUND};

pub const NO_CATEGORY: &str = "No Category";

pub const CATEGORIES: [&str; 11] = [
    NO_CATEGORY,
    "Apple Store",
    "Bar",
    "Bookstore",
    "Club",
    "Grocery Store",
    "Historic Building",
    "House",
    "Icecream Vendor",
    "Landmark",
    "Park",
];

/// A saved location
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedLocation {
    pub id: i64,
    pub description: String,
    pub category: String,
    pub coordinate: Coordinate,
    pub placemark: Option<Placemark>,
    pub date: DateTime<Local>,
    pub photo_id: Option<i64>,
}

impl TaggedLocation {
    pub fn has_photo(&self) -> bool {
        self.photo_id.is_some()
    }

    pub fn address_line(&self) -> String {
        address_line(self.placemark.as_ref())
    }
}

/// A location about to be saved, either new or replacing `id`
#[derive(Debug, Clone, PartialEq)]
pub struct LocationDraft {
    pub id: Option<i64>,
    pub description: String,
    pub category: String,
    pub coordinate: Coordinate,
    pub placemark: Option<Placemark>,
    pub date: DateTime<Local>,
    /// Image bytes to store as the location's photo
    pub photo: Option<Vec<u8>>,
}

impl LocationDraft {
    pub fn new(coordinate: Coordinate, placemark: Option<Placemark>, date: DateTime<Local>) -> Self {
        Self {
            id: None,
            description: String::new(),
            category: NO_CATEGORY.to_string(),
            coordinate,
            placemark,
            date,
            photo: None,
        }
    }

    pub fn editing(location: &TaggedLocation) -> Self {
        Self {
            id: Some(location.id),
            description: location.description.clone(),
            category: location.category.clone(),
            coordinate: location.coordinate,
            placemark: location.placemark.clone(),
            date: location.date,
            photo: None,
        }
    }
}

pub fn address_line(placemark: Option<&Placemark>) -> String {
    match placemark {
        Some(p) if !p.is_empty() => p.single_line(),
        _ => ADDRESS_NOT_FOUND.to_string(),
    }
}

/// Medium date, short time: `Jul 21, 2022 at 3:04 PM`
pub fn format_date(date: &DateTime<Local>) -> String {
    date.format("%b %-d, %Y at %-I:%M %p").to_string()
}

/// Plain-text listing of saved locations, one block per location
pub fn listing(locations: &[TaggedLocation]) -> String {
    if locations.is_empty() {
        return "No tagged locations yet\n".to_string();
    }
    let mut out = String::new();
    for loc in locations {
        let description = if loc.description.is_empty() {
            "(no description)"
        } else {
            loc.description.as_str()
        };
        out.push_str(&format!(
            "#{}  {}  [{}]  {}{}\n    {}, {}  {}\n",
            loc.id,
            format_date(&loc.date),
            loc.category,
            description,
            if loc.has_photo() { "  (photo)" } else { "" },
            format_degrees(loc.coordinate.latitude),
            format_degrees(loc.coordinate.longitude),
            loc.address_line(),
        ));
    }
    out
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("cannot read photo {path}: {source}")]
    Photo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Description,
    Category,
    PhotoPath,
}

/// Editing state of the details screen
#[derive(Debug, Clone)]
pub struct DetailsForm {
    id: Option<i64>,
    coordinate: Coordinate,
    placemark: Option<Placemark>,
    date: DateTime<Local>,
    had_photo: bool,
    categories: Vec<String>,
    category: usize,
    pub description: String,
    pub photo_path: String,
    focus: Field,
}

impl DetailsForm {
    pub fn for_new(coordinate: Coordinate, placemark: Option<Placemark>, date: DateTime<Local>) -> Self {
        Self {
            id: None,
            coordinate,
            placemark,
            date,
            had_photo: false,
            categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
            category: 0,
            description: String::new(),
            photo_path: String::new(),
            focus: Field::Description,
        }
    }

    pub fn for_existing(location: &TaggedLocation) -> Self {
        let mut form = Self::for_new(location.coordinate, location.placemark.clone(), location.date);
        form.id = Some(location.id);
        form.had_photo = location.has_photo();
        form.description = location.description.clone();
        form.category = match form.categories.iter().position(|c| *c == location.category) {
            Some(idx) => idx,
            None => {
                form.categories.push(location.category.clone());
                form.categories.len() - 1
            }
        };
        form
    }

    pub fn title(&self) -> &'static str {
        if self.id.is_some() {
            "Edit Location"
        } else {
            "Tag Location"
        }
    }

    pub fn is_editing(&self) -> bool {
        self.id.is_some()
    }

    pub fn has_photo(&self) -> bool {
        self.had_photo || !self.photo_path.trim().is_empty()
    }

    pub fn focus(&self) -> Field {
        self.focus
    }

    pub fn focus_next(&mut self) {
        self.focus = match self.focus {
            Field::Description => Field::Category,
            Field::Category => Field::PhotoPath,
            Field::PhotoPath => Field::Description,
        };
    }

    pub fn category(&self) -> &str {
        &self.categories[self.category]
    }

    pub fn next_category(&mut self) {
        self.category = (self.category + 1) % self.categories.len();
    }

    pub fn previous_category(&mut self) {
        self.category = (self.category + self.categories.len() - 1) % self.categories.len();
    }

    /// Types into the focused text field; the category field ignores text
    pub fn push_char(&mut self, c: char) {
        match self.focus {
            Field::Description => self.description.push(c),
            Field::PhotoPath => self.photo_path.push(c),
            Field::Category => {}
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            Field::Description => {
                self.description.pop();
            }
            Field::PhotoPath => {
                self.photo_path.pop();
            }
            Field::Category => {}
        }
    }

    pub fn latitude_label(&self) -> String {
        format_degrees(self.coordinate.latitude)
    }

    pub fn longitude_label(&self) -> String {
        format_degrees(self.coordinate.longitude)
    }

    pub fn address_label(&self) -> String {
        address_line(self.placemark.as_ref())
    }

    pub fn date_label(&self) -> String {
        format_date(&self.date)
    }

    pub fn to_draft(&self) -> Result<LocationDraft, FormError> {
        let path = self.photo_path.trim();
        let photo = if path.is_empty() {
            None
        } else {
            let path = PathBuf::from(path);
            let bytes = fs::read(&path).map_err(|source| FormError::Photo { path, source })?;
            Some(bytes)
        };

        Ok(LocationDraft {
            id: self.id,
            description: self.description.clone(),
            category: self.category().to_string(),
            coordinate: self.coordinate,
            placemark: self.placemark.clone(),
            date: self.date,
            photo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn date() -> DateTime<Local> {
        Local.with_ymd_and_hms(2022, 7, 21, 15, 4, 0).unwrap()
    }

    fn saved() -> TaggedLocation {
        TaggedLocation {
            id: 4,
            description: "Great coffee".into(),
            category: "Bar".into(),
            coordinate: Coordinate::new(1.5, -2.25),
            placemark: None,
            date: date(),
            photo_id: Some(0),
        }
    }

    #[test]
    fn date_label_is_medium_date_short_time() {
        assert_eq!(format_date(&date()), "Jul 21, 2022 at 3:04 PM");
    }

    #[test]
    fn listing_formats_each_location() {
        assert_eq!(listing(&[]), "No tagged locations yet\n");
        assert_eq!(
            listing(&[saved()]),
            "#4  Jul 21, 2022 at 3:04 PM  [Bar]  Great coffee  (photo)\n    1.50000000, -2.25000000  No Address Found\n"
        );
    }

    #[test]
    fn new_form_defaults() {
        let form = DetailsForm::for_new(Coordinate::new(1.0, 2.0), None, date());
        assert_eq!(form.title(), "Tag Location");
        assert_eq!(form.category(), NO_CATEGORY);
        assert_eq!(form.focus(), Field::Description);
        assert_eq!(form.address_label(), ADDRESS_NOT_FOUND);
        assert_eq!(form.latitude_label(), "1.00000000");
        assert!(!form.has_photo());
    }

    #[test]
    fn existing_form_is_prefilled() {
        let form = DetailsForm::for_existing(&saved());
        assert_eq!(form.title(), "Edit Location");
        assert_eq!(form.description, "Great coffee");
        assert_eq!(form.category(), "Bar");
        assert_eq!(form.longitude_label(), "-2.25000000");
        assert!(form.has_photo());

        let draft = form.to_draft().unwrap();
        assert_eq!(draft, LocationDraft::editing(&saved()));
    }

    #[test]
    fn unknown_category_is_kept() {
        let loc = TaggedLocation {
            category: "Secret Spot".into(),
            ..saved()
        };
        let form = DetailsForm::for_existing(&loc);
        assert_eq!(form.category(), "Secret Spot");
    }

    #[test]
    fn categories_cycle_both_ways() {
        let mut form = DetailsForm::for_new(Coordinate::new(0.0, 0.0), None, date());
        form.previous_category();
        assert_eq!(form.category(), "Park");
        form.next_category();
        form.next_category();
        assert_eq!(form.category(), "Apple Store");
    }

    #[test]
    fn typing_goes_to_focused_field() {
        let mut form = DetailsForm::for_new(Coordinate::new(0.0, 0.0), None, date());
        form.push_char('h');
        form.push_char('i');
        form.focus_next();
        form.push_char('x');
        assert_eq!(form.focus(), Field::Category);
        form.focus_next();
        form.push_char('/');
        form.backspace();
        form.push_char('p');
        assert_eq!(form.description, "hi");
        assert_eq!(form.photo_path, "p");
        form.focus_next();
        assert_eq!(form.focus(), Field::Description);
    }

    #[test]
    fn photo_bytes_are_read_into_the_draft() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("pic.jpg");
        fs::write(&photo, b"jpeg").unwrap();

        let mut form = DetailsForm::for_new(Coordinate::new(0.0, 0.0), None, date());
        form.photo_path = photo.display().to_string();
        assert_eq!(form.to_draft().unwrap().photo, Some(b"jpeg".to_vec()));
    }

    #[test]
    fn unreadable_photo_is_reported() {
        let dir = tempdir().unwrap();
        let mut form = DetailsForm::for_new(Coordinate::new(0.0, 0.0), None, date());
        form.photo_path = dir.path().join("missing.jpg").display().to_string();
        assert_matches!(form.to_draft(), Err(FormError::Photo { .. }));
    }
}
