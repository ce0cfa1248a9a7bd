//! The fleet fixture model.
//!
//! Cars belong to an optional owner, owners live at an optional address,
//! and cars have any number of drivers. `CarSummaries` is a keyless view.
//!
//! ```text
//! Address <-0..1- Owner -0..1-> Car -*-> Driver
//! ```

use crate::builder::{SqliteQueryBuilder, TableBinding, TableMapping};
use odsql_core::{
    ComplexType, EdmProvider, EdmSimpleType, EntitySet, EntityType, ExpandPath, Multiplicity, NavigationProperty,
    Property, Schema, SourceKind,
};
use std::sync::Arc;

/// Namespace of every fixture type.
pub const NAMESPACE: &str = "Fleet";

/// Tables and the view backing the model.
pub const SCHEMA_SQL: &str = "
CREATE TABLE ADDRESSES (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    CITY TEXT,
    STREET TEXT
);
CREATE TABLE OWNERS (
    ID TEXT PRIMARY KEY,
    FIRSTNAME TEXT,
    LASTNAME TEXT,
    ADDRESSID INTEGER REFERENCES ADDRESSES(ID)
);
CREATE TABLE CARS (
    ID TEXT PRIMARY KEY,
    MAKE TEXT NOT NULL,
    MODEL TEXT,
    YEAR INTEGER,
    PRICE REAL,
    ELECTRIC INTEGER,
    IMAGE BLOB,
    SIZE_LENGTH REAL,
    SIZE_WIDTH REAL,
    OWNERID TEXT REFERENCES OWNERS(ID)
);
CREATE TABLE DRIVERS (
    ID TEXT PRIMARY KEY,
    CARID TEXT REFERENCES CARS(ID) ON DELETE CASCADE,
    NAME TEXT
);
CREATE VIEW CAR_SUMMARY AS
    SELECT MAKE, COUNT(*) AS CARCOUNT FROM CARS GROUP BY MAKE ORDER BY MAKE;
";

/// Seed rows: 2 addresses, 3 owners, 7 cars, 3 drivers.
pub const SEED_SQL: &str = "
INSERT INTO ADDRESSES (ID, CITY, STREET) VALUES (1, 'Sofia', 'Vitosha 1'), (2, 'Berlin', 'Unter den Linden 5');
INSERT INTO OWNERS (ID, FIRSTNAME, LASTNAME, ADDRESSID) VALUES
    ('o1', 'Ivan', 'Petrov', 1),
    ('o2', 'Maria', 'Schmidt', 2),
    ('o3', 'Lone', 'Rider', NULL);
INSERT INTO CARS (ID, MAKE, MODEL, YEAR, PRICE, ELECTRIC, IMAGE, SIZE_LENGTH, SIZE_WIDTH, OWNERID) VALUES
    ('c1', 'BMW', 'X5', 2019, 65000.0, 0, X'010203', 4.9, 1.9, 'o1'),
    ('c2', 'BMW', '320i', 2017, 32000.0, 0, NULL, NULL, NULL, 'o1'),
    ('c3', 'Tesla', 'Model 3', 2021, 48000.0, 1, NULL, NULL, NULL, 'o2'),
    ('c4', 'Audi', 'A4', 2018, 30000.0, 0, NULL, NULL, NULL, 'o2'),
    ('c5', 'Audi', 'Q7', 2020, 70000.0, 0, NULL, NULL, NULL, NULL),
    ('c6', 'Skoda', 'Octavia', 2015, 15000.0, 0, NULL, NULL, NULL, 'o3'),
    ('c7', 'Tesla', 'Model S', 2022, 90000.0, 1, NULL, NULL, NULL, NULL);
INSERT INTO DRIVERS (ID, CARID, NAME) VALUES ('d1', 'c1', 'Alice'), ('d2', 'c1', 'Bob'), ('d3', 'c3', 'Carol');
";

/// Number of seeded cars.
pub const SEEDED_CARS: u64 = 7;

fn fqn(name: &str) -> String {
    format!("{NAMESPACE}.{name}")
}

/// Metadata of the fleet model.
#[derive(Debug)]
pub struct FleetModel {
    schema: Arc<Schema>,
    cars: Arc<EntitySet>,
    owners: Arc<EntitySet>,
    addresses: Arc<EntitySet>,
    drivers: Arc<EntitySet>,
    car_summaries: Arc<EntitySet>,
}

impl Default for FleetModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetModel {
    /// Builds the model.
    pub fn new() -> Self {
        let dimensions = Arc::new(ComplexType::new(
            NAMESPACE,
            "Dimensions",
            vec![
                Property::simple("Length", EdmSimpleType::Double),
                Property::simple("Width", EdmSimpleType::Double),
            ],
        ));

        let address = EntityType::builder(NAMESPACE, "Address")
            .key("Id", EdmSimpleType::Int32)
            .property("City", EdmSimpleType::String)
            .property("Street", EdmSimpleType::String)
            .build()
            .expect("Address type");
        let owner = EntityType::builder(NAMESPACE, "Owner")
            .key("Id", EdmSimpleType::String)
            .property("FirstName", EdmSimpleType::String)
            .property("LastName", EdmSimpleType::String)
            .property("AddressId", EdmSimpleType::Int32)
            .navigation(NavigationProperty::new("Address", fqn("Address"), Multiplicity::ZeroOrOne, "AddressId", "Id"))
            .navigation(NavigationProperty::new("Cars", fqn("Car"), Multiplicity::Many, "Id", "OwnerId"))
            .build()
            .expect("Owner type");
        let car = EntityType::builder(NAMESPACE, "Car")
            .key("Id", EdmSimpleType::String)
            .property("Make", EdmSimpleType::String)
            .property("Model", EdmSimpleType::String)
            .property("Year", EdmSimpleType::Int32)
            .property("Price", EdmSimpleType::Double)
            .property("Electric", EdmSimpleType::Boolean)
            .property("Image", EdmSimpleType::Binary)
            .property("Notes", EdmSimpleType::String)
            .complex("Size", dimensions)
            .property("OwnerId", EdmSimpleType::String)
            .navigation(NavigationProperty::new("Owner", fqn("Owner"), Multiplicity::ZeroOrOne, "OwnerId", "Id"))
            .navigation(NavigationProperty::new("Drivers", fqn("Driver"), Multiplicity::Many, "Id", "CarId"))
            .build()
            .expect("Car type");
        let driver = EntityType::builder(NAMESPACE, "Driver")
            .key("Id", EdmSimpleType::String)
            .property("CarId", EdmSimpleType::String)
            .property("Name", EdmSimpleType::String)
            .navigation(NavigationProperty::new("Car", fqn("Car"), Multiplicity::ZeroOrOne, "CarId", "Id"))
            .build()
            .expect("Driver type");
        let summary = EntityType::builder(NAMESPACE, "CarSummary")
            .property("Make", EdmSimpleType::String)
            .property("CarCount", EdmSimpleType::Int64)
            .source_kind(SourceKind::View)
            .build()
            .expect("CarSummary type");

        let mut schema = Schema::new();
        for ty in [address, owner, car, driver, summary] {
            schema.add_entity_type(ty);
        }
        let mut set = |name: &str, ty: &str| schema.add_entity_set(name, &fqn(ty)).expect("entity set");
        let cars = set("Cars", "Car");
        let owners = set("Owners", "Owner");
        let addresses = set("Addresses", "Address");
        let drivers = set("Drivers", "Driver");
        let car_summaries = set("CarSummaries", "CarSummary");

        Self {
            schema: Arc::new(schema),
            cars,
            owners,
            addresses,
            drivers,
            car_summaries,
        }
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the schema as a shared metadata provider.
    pub fn edm(&self) -> Arc<dyn EdmProvider> {
        self.schema.clone()
    }

    /// `Cars`.
    pub fn cars(&self) -> Arc<EntitySet> {
        Arc::clone(&self.cars)
    }

    /// `Owners`.
    pub fn owners(&self) -> Arc<EntitySet> {
        Arc::clone(&self.owners)
    }

    /// `Addresses`; keys are generated by the database.
    pub fn addresses(&self) -> Arc<EntitySet> {
        Arc::clone(&self.addresses)
    }

    /// `Drivers`.
    pub fn drivers(&self) -> Arc<EntitySet> {
        Arc::clone(&self.drivers)
    }

    /// `CarSummaries`, a keyless view.
    pub fn car_summaries(&self) -> Arc<EntitySet> {
        Arc::clone(&self.car_summaries)
    }

    /// Resolves an expand path from the set's type, panicking on unknown names.
    pub fn expand(&self, set: &EntitySet, path: &str) -> ExpandPath {
        self.schema
            .expand_path(&set.entity_type, path)
            .unwrap_or_else(|e| panic!("invalid expand path {path}: {e}"))
    }

    /// Returns the table bindings of the model.
    pub fn mapping(&self) -> TableMapping {
        TableMapping::new()
            .bind(fqn("Address"), TableBinding::new("ADDRESSES").with_generated_key())
            .bind(fqn("Owner"), TableBinding::new("OWNERS"))
            .bind(fqn("Car"), TableBinding::new("CARS").with_transient("Notes"))
            .bind(fqn("Driver"), TableBinding::new("DRIVERS"))
            .bind(fqn("CarSummary"), TableBinding::new("CAR_SUMMARY"))
    }

    /// Returns a query builder with default paging.
    pub fn query_builder(&self) -> SqliteQueryBuilder {
        SqliteQueryBuilder::new(self.mapping())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsql_core::EdmProvider;

    #[test]
    fn test_model_sets_and_navigation() {
        let model = FleetModel::new();
        assert_eq!(model.cars().entity_type.fqn(), "Fleet.Car");
        assert!(model.car_summaries().entity_type.is_keyless());
        assert!(model.schema().entity_type("Fleet.Dimensions").is_none());

        let path = model.expand(&model.cars(), "Owner/Address");
        let names: Vec<_> = path.segments().iter().map(|s| s.navigation.name.as_str()).collect();
        assert_eq!(names, vec!["Owner", "Address"]);
        assert_eq!(path.segments()[1].target.fqn(), "Fleet.Address");
    }

    #[test]
    fn test_unknown_navigation_is_rejected() {
        let model = FleetModel::new();
        assert!(model.schema().expand_path(&model.cars().entity_type, "Wheels").is_err());
    }
}
