mod common;

use common::{boulder, listing, observed, point, structure};
use fair_price::domain::{PropertyField, PropertyStatus, SourceRecord};
use fair_price::store::{PropertyStore, StoreError, StorePolicy};
use std::sync::Arc;

fn county_record(year_built: u16) -> SourceRecord {
    let mut structure = structure(3, 2.0, 1_800);
    structure.year_built = Some(year_built);
    SourceRecord {
        source: "county".to_string(),
        source_record_id: "R0012345".to_string(),
        address: boulder("55 Pearl Street", "80301"),
        location: point(40.0176, -105.2797),
        structure,
        list_price: None,
        last_sale_price: Some(430_000),
        last_sale_date: chrono::NaiveDate::from_ymd_opt(2019, 5, 14),
        estimate: None,
        status: None,
        observed_at: observed(2),
    }
}

#[test]
fn year_built_disagreement_is_held_for_review() {
    let store = PropertyStore::new(StorePolicy::default());
    let id = store.upsert(county_record(1995)).expect("county record stored");

    let mut incoming = listing(
        "L-55",
        boulder("55 pearl st", "80301"),
        structure(3, 2.5, 1_820),
        Some(620_000),
    );
    incoming.structure.year_built = Some(1998);

    match store.upsert(incoming) {
        Err(StoreError::ReconciliationConflict {
            property_id,
            conflicts,
        }) => {
            assert_eq!(property_id, id);
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].field, PropertyField::YearBuilt);
            assert_eq!(conflicts[0].retained_value, "1995");
            assert_eq!(conflicts[0].incoming_value, "1998");
            assert_eq!(conflicts[0].incoming_source, "listing_api");
        }
        other => panic!("expected a reconciliation conflict, got {other:?}"),
    }

    let property = store.get(&id).expect("property kept");
    assert_eq!(property.structure.year_built, Some(1995));
    assert_eq!(property.list_price, Some(620_000));
    assert_eq!(property.status, PropertyStatus::Active);
    // County outranks the listing feed for structure, so its area survives.
    assert_eq!(property.structure.living_area_sqft, Some(1_800));
    assert_eq!(property.sources.len(), 2);
    assert_eq!(store.pending_conflicts().expect("queue").len(), 1);
}

#[test]
fn every_source_record_lands_on_one_property() {
    let store = PropertyStore::new(StorePolicy::default());
    let county = store.upsert(county_record(1995)).expect("county record stored");
    let first = store
        .upsert(listing(
            "L-55",
            boulder("55 Pearl St.", "80301-1234"),
            structure(3, 2.0, 1_800),
            Some(615_000),
        ))
        .expect("listing stored");
    let again = store
        .upsert(listing(
            "L-55",
            boulder("55 PEARL ST", "80301"),
            structure(3, 2.0, 1_800),
            Some(610_000),
        ))
        .expect("listing restated");

    assert_eq!(county, first);
    assert_eq!(first, again);
    assert_eq!(store.len(), 1);

    let property = store.get(&county).expect("present");
    assert_eq!(property.last_sale_price, Some(430_000));
    let provenance = property
        .provenance
        .get(&PropertyField::ListPrice)
        .expect("list price provenance");
    assert_eq!(provenance.source, "listing_api");
}

#[test]
fn concurrent_upserts_for_one_parcel_create_one_property() {
    let store = Arc::new(PropertyStore::new(StorePolicy::default()));

    let ids: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let record = listing(
                        &format!("L-{n}"),
                        boulder("77 Canyon Blvd", "80302"),
                        structure(2, 1.0, 1_100),
                        Some(450_000 + n * 1_000),
                    );
                    store.upsert(record).expect("upsert")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread finished"))
            .collect()
    });

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(store.len(), 1);
    let property = store.get(&ids[0]).expect("present");
    assert_eq!(property.sources.len(), 8);
}

#[test]
fn retired_properties_stay_resolvable() {
    let store = PropertyStore::new(StorePolicy::default());
    let id = store.upsert(county_record(1995)).expect("stored");
    store.retire(&id).expect("retired");

    let found = store
        .find_by_fuzzy_address("55 pearl")
        .expect("lookup");
    assert_eq!(found, vec![id]);
    assert_eq!(
        store.require(&id).expect("still present").status,
        PropertyStatus::Historical
    );
}
