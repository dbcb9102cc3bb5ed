use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Column order of every ledger file.
pub const HEADER: [&str; 4] = ["Name", "Domain", "Date", "Time"];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// One attendance row. At most one exists per `(name, date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Domain")]
    pub group: String,
    #[serde(rename = "Date", with = "date_format")]
    pub date: NaiveDate,
    #[serde(rename = "Time", with = "time_format")]
    pub time: NaiveTime,
}

/// The single date/time stamp applied to every entry added by one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStamp {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl BatchStamp {
    /// Stamp with sub-second precision dropped.
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            date,
            time: time.with_nanosecond(0).unwrap_or(time),
        }
    }

    /// Current local date and time.
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        Self::new(now.date(), now.time())
    }
}

/// File name of the ledger for `date`, e.g. `attendance_2024-05-01.csv`.
pub fn ledger_file_name(date: NaiveDate) -> String {
    format!("attendance_{}.csv", date.format(DATE_FORMAT))
}

mod date_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map_err(|e| serde::de::Error::custom(format!("invalid date '{raw}': {e}")))
    }
}

mod time_format {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
            .map_err(|e| serde::de::Error::custom(format!("invalid time '{raw}': {e}")))
    }
}
