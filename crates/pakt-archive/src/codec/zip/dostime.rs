use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// MS-DOS packed date and time as stored in ZIP headers.
///
/// Date: bits 9-15 years since 1980, 5-8 month, 0-4 day.
/// Time: bits 11-15 hour, 5-10 minute, 0-4 seconds divided by two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DosTimestamp {
    pub date: u16,
    pub time: u16,
}

impl DosTimestamp {
    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Years outside 1980..=2107 are clamped; odd seconds round down.
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        let year = dt.year().clamp(1980, 2107) as u16;
        let date = ((year - 1980) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
        let time =
            ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
        Self { date, time }
    }

    /// `None` for field combinations that name no real instant, such as the
    /// all-zero timestamp some writers emit.
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        let year = 1980 + i32::from(self.date >> 9);
        let month = u32::from((self.date >> 5) & 0x0f);
        let day = u32::from(self.date & 0x1f);
        let hour = u32::from(self.time >> 11);
        let minute = u32::from((self.time >> 5) & 0x3f);
        let second = u32::from(self.time & 0x1f) * 2;

        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
    }
}
