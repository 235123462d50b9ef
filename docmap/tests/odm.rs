//! End-to-end mapping tests against the in-memory backend.

use std::sync::Arc;

use bson::Bson;
use serde::{Deserialize, Serialize};

use docmap::{memory::MemoryStore, prelude::*};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Person {
    #[serde(flatten)]
    meta: RecordMeta,
    first_name: String,
    last_name: String,
    age: i32,
    manager: One<Person>,
    reports: Many<Person>,
}

impl Record for Person {
    fn type_name() -> &'static str {
        "person"
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn relations() -> RelationSchema {
        RelationSchema::new()
            .one("manager", "person")
            .many("reports", "person")
    }
}

fn person(first_name: &str, last_name: &str, age: i32) -> Person {
    Person {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        age,
        ..Person::default()
    }
}

async fn connect() -> Arc<Connection<MemoryStore>> {
    let connection = Connection::new(MemoryStore::new());
    connection.register::<Person>("people").await.unwrap();
    connection
}

#[tokio::test]
async fn save_assigns_identity_and_timestamps_once() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let mut arthur = person("Arthur", "Dent", 42);
    assert!(arthur.meta.id.is_none());

    people.save(&mut arthur).await.unwrap();
    let id = arthur.meta.id.unwrap();
    let created_at = arthur.meta.created_at.unwrap();
    let first_updated_at = arthur.meta.updated_at.unwrap();
    assert_eq!(created_at, first_updated_at);

    arthur.age = 43;
    people.save(&mut arthur).await.unwrap();
    assert_eq!(arthur.meta.id.unwrap(), id);
    assert_eq!(arthur.meta.created_at.unwrap(), created_at);
    assert!(arthur.meta.updated_at.unwrap() >= first_updated_at);

    let found = people.find_by_id(id).one().await.unwrap();
    assert_eq!(found.age, 43);
    assert_eq!(found.meta.id.unwrap(), id);
    assert_eq!(found.meta.created_at.unwrap(), created_at);
}

#[tokio::test]
async fn find_one_reports_missing_records() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let err = people
        .find(Filter::eq("last_name", "Beeblebrox"))
        .one()
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::NotFound(collection) if collection == "people"));
}

#[tokio::test]
async fn chainable_queries_compose() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    for (first, last, age) in [
        ("Arthur", "Dent", 42),
        ("Ford", "Prefect", 200),
        ("Tricia", "McMillan", 30),
        ("Zaphod", "Beeblebrox", 250),
    ] {
        people.save(&mut person(first, last, age)).await.unwrap();
    }

    let count = people.find(Filter::gt("age", 35)).count().await.unwrap();
    assert_eq!(count, 3);

    let paged = people
        .find(Filter::gt("age", 35))
        .sort("age", SortDirection::Asc)
        .skip(1)
        .limit(1)
        .all()
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].first_name, "Ford");

    let projected = people
        .find(Filter::eq("first_name", "Tricia"))
        .select(["first_name"])
        .one()
        .await
        .unwrap();
    assert_eq!(projected.first_name, "Tricia");
    assert_eq!(projected.last_name, "");
    assert!(projected.meta.id.is_some());
}

#[tokio::test]
async fn relations_flatten_to_references() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let mut boss = person("Tricia", "McMillan", 30);
    people.save(&mut boss).await.unwrap();
    let mut ford = person("Ford", "Prefect", 200);
    people.save(&mut ford).await.unwrap();
    let mut zaphod = person("Zaphod", "Beeblebrox", 250);
    people.save(&mut zaphod).await.unwrap();

    let mut arthur = person("Arthur", "Dent", 42);
    arthur.manager = Some(Related::doc(boss.clone()));
    arthur.reports = vec![
        Related::Id(ford.meta.id.unwrap()),
        Related::doc(zaphod.clone()),
    ];
    people.save(&mut arthur).await.unwrap();

    // In-memory fields keep their live form after a save.
    assert!(arthur.manager.as_ref().unwrap().record().is_some());

    let raw = connection
        .backend()
        .query_documents(
            Query::builder()
                .filter(Filter::eq("_id", arthur.meta.id.unwrap()))
                .build(),
            "people",
        )
        .await
        .unwrap();
    let stored = raw[0].as_document().unwrap();
    assert!(matches!(stored.get("manager"), Some(Bson::Binary(_))));
    let reports = stored.get_array("reports").unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|item| matches!(item, Bson::Binary(_))));
}

#[tokio::test]
async fn populate_swaps_references_for_records_one_level_deep() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let mut zaphod = person("Zaphod", "Beeblebrox", 250);
    people.save(&mut zaphod).await.unwrap();
    let mut boss = person("Tricia", "McMillan", 30);
    boss.manager = Some(Related::Id(zaphod.meta.id.unwrap()));
    people.save(&mut boss).await.unwrap();
    let mut ford = person("Ford", "Prefect", 200);
    people.save(&mut ford).await.unwrap();

    let mut arthur = person("Arthur", "Dent", 42);
    arthur.manager = Some(Related::Id(boss.meta.id.unwrap()));
    arthur.reports = vec![
        Related::Id(ford.meta.id.unwrap()),
        Related::Id(zaphod.meta.id.unwrap()),
    ];
    people.save(&mut arthur).await.unwrap();

    // Without population the references come back bare.
    let plain = people
        .find_by_id(arthur.meta.id.unwrap())
        .one()
        .await
        .unwrap();
    assert!(plain.manager.as_ref().unwrap().record().is_none());

    let populated = people
        .find_by_id(arthur.meta.id.unwrap())
        .populate("manager")
        .populate("reports")
        .one()
        .await
        .unwrap();

    let manager = populated.manager.as_ref().unwrap().record().unwrap();
    assert_eq!(manager.first_name, "Tricia");
    // One level deep only: the manager's own manager stays a reference.
    assert!(manager.manager.as_ref().unwrap().record().is_none());

    let names: Vec<&str> = populated
        .reports
        .iter()
        .map(|related| related.record().unwrap().first_name.as_str())
        .collect();
    assert_eq!(names, vec!["Ford", "Zaphod"]);
}

#[tokio::test]
async fn dangling_one_to_one_references_surface_not_found() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let nowhere = bson::Uuid::new();
    let mut arthur = person("Arthur", "Dent", 42);
    arthur.manager = Some(Related::Id(nowhere));
    people.save(&mut arthur).await.unwrap();

    // Without population the bare reference comes back untouched.
    let plain = people
        .find_by_id(arthur.meta.id.unwrap())
        .one()
        .await
        .unwrap();
    assert_eq!(plain.manager.as_ref().unwrap().reference(), Some(nowhere));

    let err = people
        .find_by_id(arthur.meta.id.unwrap())
        .populate("manager")
        .one()
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::NotFound(_)));
}

#[tokio::test]
async fn dangling_one_to_many_references_are_dropped() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let mut ford = person("Ford", "Prefect", 200);
    people.save(&mut ford).await.unwrap();

    let mut arthur = person("Arthur", "Dent", 42);
    arthur.reports = vec![
        Related::Id(ford.meta.id.unwrap()),
        Related::Id(bson::Uuid::new()),
    ];
    people.save(&mut arthur).await.unwrap();

    let found = people
        .find_by_id(arthur.meta.id.unwrap())
        .populate("reports")
        .one()
        .await
        .unwrap();
    assert_eq!(found.reports.len(), 1);
    assert_eq!(found.reports[0].record().unwrap().first_name, "Ford");
}

#[tokio::test]
async fn empty_many_fields_stay_empty_sequences() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let mut arthur = person("Arthur", "Dent", 42);
    people.save(&mut arthur).await.unwrap();

    let raw = connection
        .backend()
        .query_documents(
            Query::builder()
                .filter(Filter::eq("_id", arthur.meta.id.unwrap()))
                .build(),
            "people",
        )
        .await
        .unwrap();
    let stored = raw[0].as_document().unwrap();
    assert_eq!(stored.get_array("reports").unwrap().len(), 0);

    let found = people
        .find_by_id(arthur.meta.id.unwrap())
        .populate("reports")
        .one()
        .await
        .unwrap();
    assert!(found.reports.is_empty());
}

#[tokio::test]
async fn unsaved_children_fail_the_save() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let mut arthur = person("Arthur", "Dent", 42);
    arthur.manager = Some(Related::doc(person("Nobody", "Nowhere", 0)));

    let err = people.save(&mut arthur).await.unwrap_err();
    assert!(matches!(err, MapperError::Schema(_)));
    // A failed save leaves the record untouched.
    assert!(arthur.meta.id.is_none());
}

#[tokio::test]
async fn unique_indexes_surface_duplicates() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();
    people.ensure_index("last_name", true).await.unwrap();

    people.save(&mut person("Arthur", "Dent", 42)).await.unwrap();

    let mut rival = person("Another", "Dent", 30);
    let err = people.save(&mut rival).await.unwrap_err();
    assert!(matches!(err, MapperError::Duplicate(collection) if collection == "people"));
    assert!(rival.meta.id.is_none());
}

#[tokio::test]
async fn populating_an_undeclared_field_is_a_schema_error() {
    let connection = connect().await;
    let people = connection.model::<Person>().await.unwrap();

    let err = people
        .find_all()
        .populate("sidekick")
        .all()
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::Schema(_)));
}

#[tokio::test]
async fn unregistered_types_are_a_configuration_error() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Gadget {
        #[serde(flatten)]
        meta: RecordMeta,
        label: String,
    }

    impl Record for Gadget {
        fn type_name() -> &'static str {
            "gadget"
        }

        fn meta(&self) -> &RecordMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta {
            &mut self.meta
        }
    }

    let connection = connect().await;
    let err = connection.model::<Gadget>().await.unwrap_err();
    assert!(matches!(err, MapperError::Configuration(_)));

    let err = connection.register::<Gadget>("").await.unwrap_err();
    assert!(matches!(err, MapperError::Configuration(_)));
}
