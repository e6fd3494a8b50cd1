use std::fs;

use assert_matches::assert_matches;
use chrono::{Duration, Local, TimeZone};
use tempfile::tempdir;

use loctag::fix::Coordinate;
use loctag::placemark::Placemark;
use loctag::store::{SaveOutcome, StoreError, TagStore};
use loctag::tag::{self, DetailsForm, LocationDraft};

fn cupertino() -> Placemark {
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
fn locations_survive_reopening_the_database() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("state").join("locations.db");
    let photos = dir.path().join("state").join("photos");
    let date = Local.with_ymd_and_hms(2022, 7, 21, 15, 4, 0).unwrap();

    let id = {
        let mut store = TagStore::open(&db, &photos).unwrap();
        let mut draft = LocationDraft::new(Coordinate::new(37.33182, -122.03118), Some(cupertino()), date);
        draft.description = "Headquarters".into();
        draft.category = "Landmark".into();
        draft.photo = Some(b"jpeg bytes".to_vec());
        store.save(&draft).unwrap().id()
    };

    let store = TagStore::open(&db, &photos).unwrap();
    let saved = store.get(id).unwrap();
    assert_eq!(saved.description, "Headquarters");
    assert_eq!(saved.category, "Landmark");
    assert_eq!(saved.placemark, Some(cupertino()));
    assert_eq!(saved.date, date);
    assert_eq!(
        saved.address_line(),
        "1 Infinite Loop, Cupertino, CA 95014, United States"
    );

    let photo = store.photo_path_for(&saved).unwrap();
    assert_eq!(fs::read(photo).unwrap(), b"jpeg bytes");
}

#[test]
fn editing_through_the_form_keeps_the_photo() {
    let dir = tempdir().unwrap();
    let mut store = TagStore::in_memory(dir.path().join("photos")).unwrap();

    let picture = dir.path().join("pic.jpg");
    fs::write(&picture, b"first").unwrap();
    let mut form = DetailsForm::for_new(Coordinate::new(1.0, 2.0), None, Local::now());
    form.description = "Park bench".into();
    form.photo_path = picture.display().to_string();
    let tagged = store.save(&form.to_draft().unwrap()).unwrap();
    assert_matches!(tagged, SaveOutcome::Tagged(_));

    let location = store.get(tagged.id()).unwrap();
    let photo_id = location.photo_id;
    assert!(photo_id.is_some());

    let mut edit = DetailsForm::for_existing(&location);
    edit.next_category();
    let updated = store.save(&edit.to_draft().unwrap()).unwrap();
    assert_eq!(updated, SaveOutcome::Updated(tagged.id()));

    let location = store.get(tagged.id()).unwrap();
    assert_eq!(location.photo_id, photo_id);
    assert_eq!(location.description, "Park bench");
    assert_eq!(fs::read(store.photo_path_for(&location).unwrap()).unwrap(), b"first");
}

#[test]
fn listing_is_newest_first_and_delete_removes_photo() {
    let dir = tempdir().unwrap();
    let mut store = TagStore::in_memory(dir.path().join("photos")).unwrap();
    let now = Local::now();

    let mut older = LocationDraft::new(Coordinate::new(1.0, 1.0), None, now - Duration::days(1));
    older.description = "Yesterday".into();
    older.photo = Some(vec![1, 2, 3]);
    let older_id = store.save(&older).unwrap().id();

    let mut newer = LocationDraft::new(Coordinate::new(2.0, 2.0), None, now);
    newer.description = "Today".into();
    store.save(&newer).unwrap();

    let all = store.all().unwrap();
    let names: Vec<_> = all.iter().map(|l| l.description.as_str()).collect();
    assert_eq!(names, vec!["Today", "Yesterday"]);
    assert!(tag::listing(&all).contains("Yesterday  (photo)"));

    let photo = store.photo_path_for(&store.get(older_id).unwrap()).unwrap();
    assert!(photo.exists());
    store.delete(older_id).unwrap();
    assert!(!photo.exists());
    assert_matches!(store.get(older_id), Err(StoreError::NotFound(_)));
    assert_eq!(store.all().unwrap().len(), 1);
}
