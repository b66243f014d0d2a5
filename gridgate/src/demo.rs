//! Demo grids served by the binary and used throughout the tests: a bus list keyed by
//! `depot|bus_no` and an employee list keyed by a five part identifier.

use crate::columns::{ColumnAugmentation, ColumnDef};
use crate::entity::{EntityDescriptor, ValidationRule};
use crate::error::AppError;
use crate::identifier::KeyType;
use crate::info;
use crate::model::Row;
use crate::procedure::ProcedureCatalog;
use crate::registry::{ProcedureRegistration, RedbRegistry};
use crate::store::GridStore;
use serde_json::json;

pub const MAIN_STORE: &str = "main";
pub const BUSES: &str = "sp_Grid_Buses";
pub const EMPLOYEES: &str = "sp_Grid_Example_Employees";

const DEPOTS: [&str; 4] = ["North", "South", "East", "West"];
const BUSES_PER_DEPOT: i64 = 300;
const BASE_KV: [f64; 6] = [69.0, 115.0, 138.0, 230.0, 345.0, 500.0];
const ZONES: [&str; 3] = ["Z1", "Z2", "Z3"];
const COMPANIES: [&str; 2] = ["Acme", "Globex"];
const DIVISIONS: [&str; 3] = ["Ops", "Sales", "R&D"];
const TITLES: [&str; 4] = ["Engineer", "Analyst", "Manager", "Technician"];

pub fn bus_entity() -> EntityDescriptor {
    EntityDescriptor::new("buses")
        .column(ColumnDef::text("depot", "Depot").width(110))
        .column(ColumnDef::numeric("bus_no", "Bus No").width(90))
        .column(ColumnDef::text("name", "Name").editable())
        .column(ColumnDef::numeric("baskv", "Base kV").editable().group("Electrical"))
        .column(ColumnDef::numeric("vmin", "V min (pu)").editable().group("Electrical"))
        .column(ColumnDef::numeric("vmax", "V max (pu)").editable().group("Electrical"))
        .column(ColumnDef::set("zone", "Zone").editable())
        .key("depot", KeyType::Text)
        .key("bus_no", KeyType::Int)
        .rule(ValidationRule::Range { field: "baskv".into(), min: 0.0, max: 1000.0 })
        .rule(ValidationRule::Range { field: "vmin".into(), min: 0.5, max: 1.5 })
        .rule(ValidationRule::Range { field: "vmax".into(), min: 0.5, max: 1.5 })
        .rule(ValidationRule::Ordered { lower: "vmin".into(), upper: "vmax".into() })
        .unique("name")
}

pub fn employee_entity() -> EntityDescriptor {
    EntityDescriptor::new("employees")
        .column(ColumnDef::text("company", "Company"))
        .column(ColumnDef::text("division", "Division"))
        .column(ColumnDef::numeric("department", "Dept").width(80))
        .column(ColumnDef::text("hire_date", "Hired"))
        .column(ColumnDef::numeric("badge", "Badge").width(90))
        .column(ColumnDef::text("full_name", "Name").editable())
        .column(ColumnDef::set("title", "Title").editable())
        .column(ColumnDef::text("email", "Email").editable().unsortable())
        .column(ColumnDef::numeric("salary", "Salary").editable())
        .column(ColumnDef::text("end_date", "Left").editable())
        .key("company", KeyType::Text)
        .key("division", KeyType::Text)
        .key("department", KeyType::Int)
        .key("hire_date", KeyType::Date)
        .key("badge", KeyType::Int)
        .rule(ValidationRule::Range { field: "salary".into(), min: 0.0, max: 1_000_000.0 })
        .rule(ValidationRule::Ordered { lower: "hire_date".into(), upper: "end_date".into() })
        .unique("email")
}

pub fn catalog() -> ProcedureCatalog {
    let mut catalog = ProcedureCatalog::new();
    catalog.grid(BUSES, bus_entity());
    catalog.grid(EMPLOYEES, employee_entity());
    catalog.augment(BUSES, "zone", ColumnAugmentation::dropdown(ZONES.iter().map(|z| (*z, *z)), false));
    catalog.augment(BUSES, "depot", ColumnAugmentation::link("/depots/{depot}", None));
    catalog.augment(EMPLOYEES, "title", ColumnAugmentation::dropdown(TITLES.iter().map(|t| (*t, *t)), true));
    catalog.augment(EMPLOYEES, "email", ColumnAugmentation::link("mailto:{email}", Some("_blank")));
    catalog
}

/// Employees can be edited but not deleted through the grid: no delete procedure is registered.
pub fn registrations(admin_role: &str) -> Vec<ProcedureRegistration> {
    vec![
        ProcedureRegistration::new(BUSES, MAIN_STORE).roles([admin_role, "User"]),
        ProcedureRegistration::new("sp_Grid_Update_Bus", MAIN_STORE).roles([admin_role, "User"]),
        ProcedureRegistration::new("sp_Grid_Delete_Bus", MAIN_STORE).roles([admin_role]),
        ProcedureRegistration::new(EMPLOYEES, MAIN_STORE).roles([admin_role, "HR"]).page_sizes(25, 100),
        ProcedureRegistration::new("sp_Grid_Update_Employee", MAIN_STORE).roles([admin_role, "HR"]),
    ]
}

fn as_row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}

pub fn bus_rows() -> Vec<Row> {
    let mut rows = Vec::with_capacity(DEPOTS.len() * BUSES_PER_DEPOT as usize);
    for (d, depot) in DEPOTS.iter().enumerate() {
        for bus_no in 1..=BUSES_PER_DEPOT {
            let i = d * BUSES_PER_DEPOT as usize + bus_no as usize;
            rows.push(as_row(json!({
                "depot": depot,
                "bus_no": bus_no,
                "name": format!("{} {:03}", depot, bus_no),
                "baskv": BASE_KV[i % BASE_KV.len()],
                "vmin": 0.9,
                "vmax": 1.1,
                "zone": ZONES[i % ZONES.len()],
            })));
        }
    }
    rows
}

pub fn employee_rows() -> Vec<Row> {
    let mut rows = Vec::new();
    for i in 0..48usize {
        let company = COMPANIES[i % COMPANIES.len()];
        let badge = 1000 + i as i64;
        rows.push(as_row(json!({
            "company": company,
            "division": DIVISIONS[i % DIVISIONS.len()],
            "department": 10 + (i % 4) as i64 * 10,
            "hire_date": format!("20{:02}-{:02}-{:02}", 10 + i % 12, 1 + i % 12, 1 + i % 28),
            "badge": badge,
            "full_name": format!("Employee {}", badge),
            "title": TITLES[i % TITLES.len()],
            "email": format!("e{}@{}.example", badge, company.to_lowercase()),
            "salary": 40_000 + (i as i64 * 1_250),
            "end_date": null,
        })));
    }
    rows
}

pub fn seed_rows(store: &dyn GridStore) -> Result<usize, AppError> {
    let buses = store.insert(&bus_entity(), bus_rows())?;
    let employees = store.insert(&employee_entity(), employee_rows())?;
    Ok(buses.len() + employees.len())
}

/// Provisions registrations and rows into an empty registry; a provisioned one is left alone.
pub fn install(registry: &RedbRegistry, store: &dyn GridStore, admin_role: &str) -> Result<bool, AppError> {
    if !registry.is_empty()? {
        return Ok(false);
    }
    for registration in registrations(admin_role) {
        registry.upsert(&registration)?;
    }
    let rows = seed_rows(store)?;
    info!("Seeded {} demo rows", rows);
    Ok(true)
}
