//! Deterministic starter roster.

use rostersync_protocol::Record;

const SEED_TIMESTAMP: &str = "2024-01-15T08:00:00.000Z";

const ROSTER: [(&str, &str, &str, &str, &str, u8); 10] = [
    ("Aarav Shah", "O+", "10", "A", "aarav.shah", 92),
    ("Diya Menon", "A+", "10", "A", "diya.menon", 88),
    ("Kabir Singh", "B+", "10", "B", "kabir.singh", 75),
    ("Meera Iyer", "AB+", "9", "C", "meera.iyer", 71),
    ("Rohan Das", "O-", "9", "A", "rohan.das", 95),
    ("Saanvi Gupta", "A-", "9", "B", "saanvi.gupta", 83),
    ("Vihaan Nair", "B-", "8", "A", "vihaan.nair", 67),
    ("Ananya Bose", "AB-", "8", "B", "ananya.bose", 90),
    ("Ishaan Patel", "O+", "8", "C", "ishaan.patel", 79),
    ("Kiara Reddy", "A+", "7", "A", "kiara.reddy", 98),
];

/// Returns the ten-record roster a fresh server starts with.
pub fn default_roster() -> Vec<Record> {
    ROSTER
        .iter()
        .enumerate()
        .map(|(i, &(name, blood_group, class, section, handle, attendance))| {
            let n = i + 1;
            Record {
                id: format!("stu-{n:03}"),
                roll_number: format!("R{n:03}"),
                name: name.to_string(),
                blood_group: blood_group.to_string(),
                class: class.to_string(),
                section: section.to_string(),
                phone: format!("555-01{n:02}"),
                email: format!("{handle}@example.edu"),
                attendance,
                last_updated: SEED_TIMESTAMP.to_string(),
            }
        })
        .collect()
}
