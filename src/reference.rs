use std::fmt;

use csv::ReaderBuilder;
use csv::Trim;
use csv::WriterBuilder;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const MAX_UPLOAD_BYTES: u32 = 1024 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTable {
  Cities,
  Specializations,
  Clinics,
  Vets,
  Schedules,
}

impl ReferenceTable {
  // Parents before children.
  pub const ALL: [Self; 5] = [
    Self::Cities,
    Self::Specializations,
    Self::Clinics,
    Self::Vets,
    Self::Schedules,
  ];

  pub fn file_name(self) -> &'static str {
    match self {
      Self::Cities => "cities.csv",
      Self::Specializations => "specializations.csv",
      Self::Clinics => "clinics.csv",
      Self::Vets => "vets.csv",
      Self::Schedules => "schedules.csv",
    }
  }

  fn headers(self) -> &'static [&'static str] {
    match self {
      Self::Cities | Self::Specializations => &["id", "name"],
      Self::Clinics => &["id", "city_id", "name", "address", "phone"],
      Self::Vets => &["id", "full_name", "description", "specializations"],
      Self::Schedules => &["vet_id", "clinic_id", "weekday"],
    }
  }

  pub fn from_file_name(name: &str) -> Option<Self> {
    let name = name.trim().to_lowercase();
    Self::ALL.into_iter().find(|table| table.file_name() == name)
  }
}

impl fmt::Display for ReferenceTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.file_name().trim_end_matches(".csv"))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CityRecord {
  pub id: i64,
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecializationRecord {
  pub id: i64,
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClinicRecord {
  pub id: i64,
  pub city_id: i64,
  pub name: String,
  pub address: Option<String>,
  pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VetRecord {
  pub id: i64,
  pub full_name: String,
  pub description: Option<String>,
  #[serde(default)]
  pub specializations: String,
}

impl VetRecord {
  pub fn specialization_ids(&self) -> Result<Vec<i64>, String> {
    self
      .specializations
      .split(';')
      .map(str::trim)
      .filter(|part| !part.is_empty())
      .map(|part| part.parse::<i64>().map_err(|_| format!("bad specialization id {part:?}")))
      .collect()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleRecord {
  pub vet_id: i64,
  pub clinic_id: i64,
  pub weekday: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceData {
  pub cities: Vec<CityRecord>,
  pub specializations: Vec<SpecializationRecord>,
  pub clinics: Vec<ClinicRecord>,
  pub vets: Vec<VetRecord>,
  pub schedules: Vec<ScheduleRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceRows {
  Cities(Vec<CityRecord>),
  Specializations(Vec<SpecializationRecord>),
  Clinics(Vec<ClinicRecord>),
  Vets(Vec<VetRecord>),
  // Replaces the whole schedule of every vet that appears in the file.
  Schedules(Vec<ScheduleRecord>),
}

impl ReferenceRows {
  pub fn table(&self) -> ReferenceTable {
    match self {
      Self::Cities(_) => ReferenceTable::Cities,
      Self::Specializations(_) => ReferenceTable::Specializations,
      Self::Clinics(_) => ReferenceTable::Clinics,
      Self::Vets(_) => ReferenceTable::Vets,
      Self::Schedules(_) => ReferenceTable::Schedules,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Self::Cities(rows) => rows.len(),
      Self::Specializations(rows) => rows.len(),
      Self::Clinics(rows) => rows.len(),
      Self::Vets(rows) => rows.len(),
      Self::Schedules(rows) => rows.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Debug, Error)]
pub enum ImportError {
  #[error("unknown file {0:?}")]
  UnknownFile(String),
  #[error("file is larger than {limit} bytes", limit = MAX_UPLOAD_BYTES)]
  TooLarge,
  #[error("file has no rows")]
  Empty,
  #[error("row {row}: {source}")]
  Malformed {
    row: usize,
    #[source]
    source: csv::Error,
  },
  #[error("row {row}: {reason}")]
  Invalid { row: usize, reason: String },
}

impl ImportError {
  pub fn user_message(&self) -> String {
    match self {
      Self::UnknownFile(_) => {
        let names: Vec<&str> = ReferenceTable::ALL.iter().map(|table| table.file_name()).collect();
        format!("📄 Name the file after the table it holds: {}.", names.join(", "))
      },
      other => format!("❌ Import rejected, nothing was changed: {other}."),
    }
  }
}

pub fn export_table(table: ReferenceTable, data: &ReferenceData) -> Result<Vec<u8>, csv::Error> {
  match table {
    ReferenceTable::Cities => write_csv(table, &data.cities),
    ReferenceTable::Specializations => write_csv(table, &data.specializations),
    ReferenceTable::Clinics => write_csv(table, &data.clinics),
    ReferenceTable::Vets => write_csv(table, &data.vets),
    ReferenceTable::Schedules => write_csv(table, &data.schedules),
  }
}

pub fn parse_upload(file_name: &str, content: &[u8]) -> Result<ReferenceRows, ImportError> {
  let table = ReferenceTable::from_file_name(file_name).ok_or_else(|| ImportError::UnknownFile(file_name.to_string()))?;
  let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
  let rows = match table {
    ReferenceTable::Cities => {
      let rows: Vec<CityRecord> = read_csv(content)?;
      check_rows(&rows, |row| check_named(row.id, &row.name))?;
      ReferenceRows::Cities(rows)
    },
    ReferenceTable::Specializations => {
      let rows: Vec<SpecializationRecord> = read_csv(content)?;
      check_rows(&rows, |row| check_named(row.id, &row.name))?;
      ReferenceRows::Specializations(rows)
    },
    ReferenceTable::Clinics => {
      let rows: Vec<ClinicRecord> = read_csv(content)?;
      check_rows(&rows, |row| check_named(row.id, &row.name))?;
      ReferenceRows::Clinics(rows)
    },
    ReferenceTable::Vets => {
      let rows: Vec<VetRecord> = read_csv(content)?;
      check_rows(&rows, |row| {
        check_named(row.id, &row.full_name)?;
        row.specialization_ids().map(|_| ())
      })?;
      ReferenceRows::Vets(rows)
    },
    ReferenceTable::Schedules => {
      let rows: Vec<ScheduleRecord> = read_csv(content)?;
      check_rows(&rows, |row| {
        if (1 ..= 7).contains(&row.weekday) {
          Ok(())
        } else {
          Err(format!("weekday must be 1 to 7, got {}", row.weekday))
        }
      })?;
      ReferenceRows::Schedules(rows)
    },
  };
  if rows.is_empty() {
    return Err(ImportError::Empty);
  }
  Ok(rows)
}

fn write_csv<T: Serialize>(table: ReferenceTable, rows: &[T]) -> Result<Vec<u8>, csv::Error> {
  let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
  writer.write_record(table.headers())?;
  for row in rows {
    writer.serialize(row)?;
  }
  writer.into_inner().map_err(|err| csv::Error::from(err.into_error()))
}

fn read_csv<T: DeserializeOwned>(content: &[u8]) -> Result<Vec<T>, ImportError> {
  let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(content);
  reader
    .deserialize()
    .enumerate()
    // Line 1 is the header.
    .map(|(index, record)| record.map_err(|source| ImportError::Malformed { row: index + 2, source }))
    .collect()
}

fn check_rows<T>(rows: &[T], check: impl Fn(&T) -> Result<(), String>) -> Result<(), ImportError> {
  for (index, row) in rows.iter().enumerate() {
    check(row).map_err(|reason| ImportError::Invalid { row: index + 2, reason })?;
  }
  Ok(())
}

fn check_named(id: i64, name: &str) -> Result<(), String> {
  if id <= 0 {
    return Err(format!("id must be positive, got {id}"));
  }
  if name.is_empty() {
    return Err("name is empty".to_string());
  }
  Ok(())
}
