//! Spreadsheet import: header mapping, cell normalization and the merge of
//! accepted rows into the document through the usual create-resource path.

use crate::error::{Error, Result};
use crate::storage::{Diet, Document, Gender, ResourceDraft};
use calamine::{Data, Range, Reader};
use chrono::{Duration, NaiveDate};
use std::io::Cursor;

/// Outcome of one uploaded batch. Skipped rows are counted, never fatal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped: usize,
}

/// Read the first worksheet of an .xlsx/.xls byte buffer into drafts.
/// The buffer is request-local; nothing is written to disk.
pub fn parse_workbook(bytes: &[u8]) -> Result<Vec<ResourceDraft>> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook =
        calamine::open_workbook_auto_from_rs(cursor).map_err(|_| Error::MalformedUpload)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(Error::MalformedUpload)?
        .map_err(|_| Error::MalformedUpload)?;
    Ok(rows_from_range(&range))
}

/// Run every accepted row through create-resource semantics. Rows with an
/// empty or already-registered mobile are skipped; earlier rows of the same
/// batch count as registered.
pub fn merge(
    doc: &mut Document,
    manager_id: u32,
    rows: Vec<ResourceDraft>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for draft in rows {
        if draft.mobile.is_empty() {
            summary.skipped += 1;
            continue;
        }
        match doc.create_resource(manager_id, draft) {
            Ok(_) => summary.added += 1,
            Err(Error::DuplicateMobile) => summary.skipped += 1,
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

fn rows_from_range(range: &Range<Data>) -> Vec<ResourceDraft> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let col = |name: &str| {
        header
            .iter()
            .position(|c| matches!(c, Data::String(s) if s.trim() == name))
    };
    let name_col = col("Name");
    let project_col = col("Project");
    let joining_col = col("Joining Date");
    let birthday_col = col("Birthday");
    let diet_col = col("Diet");
    let skills_col = col("Skills");
    // older sheets use "Sex" for the gender column
    let gender_col = col("Gender").or_else(|| col("Sex"));
    let mobile_col = col("Mobile");

    let cell = |row: &[Data], col: Option<usize>| {
        col.and_then(|i| row.get(i)).cloned().unwrap_or(Data::Empty)
    };
    rows.map(|row| ResourceDraft {
        name: text(&cell(row, name_col)),
        project: text(&cell(row, project_col)),
        joining_date: normalize_date(&cell(row, joining_col)),
        birthday: normalize_date(&cell(row, birthday_col)),
        diet: parse_diet(&text(&cell(row, diet_col))),
        skills: text(&cell(row, skills_col)),
        gender: parse_gender(&text(&cell(row, gender_col))),
        mobile: normalize_mobile(&cell(row, mobile_col)),
    })
    .collect()
}

fn text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Numeric cells arrive as floats; render them as plain integers so a
/// mobile number never grows a trailing `.0`.
fn normalize_mobile(cell: &Data) -> String {
    match cell {
        Data::Float(f) => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        Data::String(s) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// Normalize a date cell to `YYYY-MM-DD`. Numeric cells are spreadsheet
/// serial dates (days since 1899-12-30); `DD-MM-YYYY` strings are
/// rearranged; anything else passes through unchanged.
fn normalize_date(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) => serial_to_iso(*f),
        Data::Int(i) => serial_to_iso(*i as f64),
        Data::DateTime(dt) => serial_to_iso(dt.as_f64()),
        Data::String(s) => normalize_date_str(s.trim()),
        other => other.to_string(),
    }
}

fn serial_to_iso(serial: f64) -> String {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
    match epoch.checked_add_signed(Duration::days(serial.trunc() as i64)) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

fn normalize_date_str(s: &str) -> String {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() == 3 && parts[0].len() == 2 && parts[2].len() == 4 {
        format!("{}-{}-{}", parts[2], parts[1], parts[0])
    } else {
        s.to_string()
    }
}

fn parse_diet(s: &str) -> Diet {
    if s.eq_ignore_ascii_case("non-veg") {
        Diet::NonVeg
    } else {
        Diet::Veg
    }
}

fn parse_gender(s: &str) -> Gender {
    if s.eq_ignore_ascii_case("female") {
        Gender::Female
    } else if s.eq_ignore_ascii_case("other") {
        Gender::Other
    } else {
        Gender::Male
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Role, User};

    const MANAGER: u32 = 100_001;

    fn doc_with_manager() -> Document {
        Document {
            users: vec![User {
                id: MANAGER,
                name: "Meera".into(),
                mobile: "9999999999".into(),
                password: "secret".into(),
                role: Role::Manager,
            }],
            ..Document::default()
        }
    }

    fn draft(name: &str, mobile: &str) -> ResourceDraft {
        ResourceDraft {
            name: name.into(),
            project: String::new(),
            joining_date: String::new(),
            birthday: String::new(),
            diet: Diet::Veg,
            skills: String::new(),
            gender: Gender::Male,
            mobile: mobile.into(),
        }
    }

    #[test]
    fn serial_dates_normalize_to_iso() {
        assert_eq!(normalize_date(&Data::Float(44197.0)), "2021-01-01");
        assert_eq!(normalize_date(&Data::Int(44197)), "2021-01-01");
        // time-of-day fractions are dropped
        assert_eq!(normalize_date(&Data::Float(44197.75)), "2021-01-01");
    }

    #[test]
    fn day_month_year_strings_are_rearranged() {
        assert_eq!(
            normalize_date(&Data::String("05-03-2024".into())),
            "2024-03-05"
        );
    }

    #[test]
    fn other_strings_pass_through() {
        assert_eq!(
            normalize_date(&Data::String("2024-03-05".into())),
            "2024-03-05"
        );
        assert_eq!(normalize_date(&Data::String("March 5".into())), "March 5");
        assert_eq!(normalize_date(&Data::Empty), "");
    }

    #[test]
    fn numeric_mobiles_lose_no_digits_and_gain_no_decimal() {
        assert_eq!(normalize_mobile(&Data::Float(9000000001.0)), "9000000001");
        assert_eq!(normalize_mobile(&Data::Int(9000000001)), "9000000001");
        assert_eq!(
            normalize_mobile(&Data::String(" 9000000001 ".into())),
            "9000000001"
        );
        assert_eq!(normalize_mobile(&Data::Empty), "");
    }

    #[test]
    fn lenient_cell_values_fall_back_to_defaults() {
        assert_eq!(parse_diet("Non-Veg"), Diet::NonVeg);
        assert_eq!(parse_diet("non-veg"), Diet::NonVeg);
        assert_eq!(parse_diet(""), Diet::Veg);
        assert_eq!(parse_gender("Female"), Gender::Female);
        assert_eq!(parse_gender("Other"), Gender::Other);
        assert_eq!(parse_gender(""), Gender::Male);
    }

    #[test]
    fn merge_skips_duplicates_and_counts_them() {
        let mut doc = doc_with_manager();
        doc.create_resource(MANAGER, draft("Existing", "9000000002"))
            .unwrap();

        let rows = vec![
            draft("Asha", "9000000001"),
            draft("Binod", "9000000002"), // already registered
            draft("Chitra", "9000000003"),
        ];
        let summary = merge(&mut doc, MANAGER, rows).unwrap();
        assert_eq!(summary, ImportSummary { added: 2, skipped: 1 });
        assert_eq!(doc.resources.len(), 3);
        // one seeded manager plus three auto-provisioned accounts
        assert_eq!(doc.users.len(), 4);
    }

    #[test]
    fn merge_skips_empty_mobiles_and_intra_batch_duplicates() {
        let mut doc = doc_with_manager();
        let rows = vec![
            draft("Asha", "9000000001"),
            draft("Asha again", "9000000001"),
            draft("No mobile", ""),
        ];
        let summary = merge(&mut doc, MANAGER, rows).unwrap();
        assert_eq!(summary, ImportSummary { added: 1, skipped: 2 });
        assert_eq!(doc.resources.len(), 1);
    }

    #[test]
    fn imported_rows_are_stamped_with_the_manager() {
        let mut doc = doc_with_manager();
        merge(&mut doc, MANAGER, vec![draft("Asha", "9000000001")]).unwrap();
        assert_eq!(doc.resources[0].manager_id, Some(MANAGER));
        let account = doc.users.iter().find(|u| u.mobile == "9000000001").unwrap();
        assert_eq!(account.password, "9000000001");
    }

    #[test]
    fn header_row_maps_by_name_with_legacy_sex_column() {
        let mut range = Range::new((0, 0), (1, 7));
        for (i, h) in ["Name", "Project", "Joining Date", "Birthday", "Diet", "Skills", "Sex", "Mobile"]
            .iter()
            .enumerate()
        {
            range.set_value((0, i as u32), Data::String((*h).into()));
        }
        range.set_value((1, 0), Data::String("Asha".into()));
        range.set_value((1, 1), Data::String("Atlas".into()));
        range.set_value((1, 2), Data::Float(44197.0));
        range.set_value((1, 3), Data::String("05-03-2024".into()));
        range.set_value((1, 4), Data::String("Non-Veg".into()));
        range.set_value((1, 5), Data::String("rust".into()));
        range.set_value((1, 6), Data::String("Female".into()));
        range.set_value((1, 7), Data::Float(9000000001.0));

        let rows = rows_from_range(&range);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.name, "Asha");
        assert_eq!(row.joining_date, "2021-01-01");
        assert_eq!(row.birthday, "2024-03-05");
        assert_eq!(row.diet, Diet::NonVeg);
        assert_eq!(row.gender, Gender::Female);
        assert_eq!(row.mobile, "9000000001");
    }
}
