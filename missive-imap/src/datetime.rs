//! `date` and `date-time` of the IMAP grammar (RFC 3501 §9).

use std::fmt;
use std::str::from_utf8;

use chrono::{FixedOffset, LocalResult, NaiveDate as ChronoNaiveDate, TimeZone};
use nom::{
    branch::alt,
    bytes::streaming::{tag_no_case, take_while_m_n},
    character::streaming::char,
    combinator::{map, map_res, value},
    sequence::{delimited, preceded, tuple},
};

use crate::core::{dquote, is, sp, DIGIT};
use crate::decode::{ImapErrorKind, ImapParseError, ImapResult};

/// `date-time = DQUOTE date-day-fixed "-" date-month "-" date-year SP time SP zone DQUOTE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime(pub(crate) chrono::DateTime<FixedOffset>);

impl DateTime {
    pub fn unvalidated(inner: chrono::DateTime<FixedOffset>) -> Self {
        Self(inner)
    }

    pub fn inner(&self) -> &chrono::DateTime<FixedOffset> {
        &self.0
    }
}

impl From<chrono::DateTime<FixedOffset>> for DateTime {
    fn from(inner: chrono::DateTime<FixedOffset>) -> Self {
        Self(inner)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `%e` is the space-padded day mandated by `date-day-fixed`.
        write!(f, "{}", self.0.format("%e-%b-%Y %H:%M:%S %z"))
    }
}

/// `date = date-text / DQUOTE date-text DQUOTE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaiveDate(pub(crate) ChronoNaiveDate);

impl NaiveDate {
    pub fn unvalidated(inner: ChronoNaiveDate) -> Self {
        Self(inner)
    }

    pub fn inner(&self) -> &ChronoNaiveDate {
        &self.0
    }
}

impl fmt::Display for NaiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%-d-%b-%Y"))
    }
}

// ----- parsers -----

fn digits_u32(count: usize) -> impl for<'a> Fn(&'a [u8]) -> ImapResult<'a, u32> {
    move |input| {
        map_res(
            // Safety: digits are ASCII-only.
            map(take_while_m_n(count, count, |b| is(b, DIGIT)), |val| {
                from_utf8(val).unwrap()
            }),
            str::parse::<u32>,
        )(input)
    }
}

/// `date-day = 1*2DIGIT`
fn date_day(input: &[u8]) -> ImapResult<'_, u32> {
    alt((digits_u32(2), digits_u32(1)))(input)
}

/// `date-day-fixed = (SP DIGIT) / 2DIGIT`
fn date_day_fixed(input: &[u8]) -> ImapResult<'_, u32> {
    alt((preceded(sp, digits_u32(1)), digits_u32(2)))(input)
}

/// `date-month = "Jan" / "Feb" / "Mar" / "Apr" / "May" / "Jun" / "Jul" / "Aug" / "Sep" / "Oct" / "Nov" / "Dec"`
fn date_month(input: &[u8]) -> ImapResult<'_, u32> {
    alt((
        value(1, tag_no_case(b"Jan")),
        value(2, tag_no_case(b"Feb")),
        value(3, tag_no_case(b"Mar")),
        value(4, tag_no_case(b"Apr")),
        value(5, tag_no_case(b"May")),
        value(6, tag_no_case(b"Jun")),
        value(7, tag_no_case(b"Jul")),
        value(8, tag_no_case(b"Aug")),
        value(9, tag_no_case(b"Sep")),
        value(10, tag_no_case(b"Oct")),
        value(11, tag_no_case(b"Nov")),
        value(12, tag_no_case(b"Dec")),
    ))(input)
}

/// `date-year = 4DIGIT`
fn date_year(input: &[u8]) -> ImapResult<'_, u32> {
    digits_u32(4)(input)
}

/// `time = 2DIGIT ":" 2DIGIT ":" 2DIGIT`
fn time(input: &[u8]) -> ImapResult<'_, (u32, u32, u32)> {
    let (rem, (h, _, m, _, s)) = tuple((
        digits_u32(2),
        char(':'),
        digits_u32(2),
        char(':'),
        digits_u32(2),
    ))(input)?;
    Ok((rem, (h, m, s)))
}

/// `zone = ("+" / "-") 4DIGIT`
fn zone(input: &[u8]) -> ImapResult<'_, i32> {
    let (rem, (sign, hh, mm)) = tuple((
        alt((value(1, char('+')), value(-1, char('-')))),
        digits_u32(2),
        digits_u32(2),
    ))(input)?;
    Ok((rem, sign * (hh as i32 * 3600 + mm as i32 * 60)))
}

fn date_text(input: &[u8]) -> ImapResult<'_, NaiveDate> {
    let (rem, (day, _, month, _, year)) =
        tuple((date_day, char('-'), date_month, char('-'), date_year))(input)?;

    match ChronoNaiveDate::from_ymd_opt(year as i32, month, day) {
        Some(date) => Ok((rem, NaiveDate(date))),
        None => Err(nom::Err::Failure(ImapParseError {
            input,
            kind: ImapErrorKind::DateTime,
        })),
    }
}

/// `date = date-text / DQUOTE date-text DQUOTE`
pub(crate) fn date(input: &[u8]) -> ImapResult<'_, NaiveDate> {
    alt((date_text, delimited(dquote, date_text, dquote)))(input)
}

/// `date-time = DQUOTE date-day-fixed "-" date-month "-" date-year SP time SP zone DQUOTE`
pub(crate) fn date_time(input: &[u8]) -> ImapResult<'_, DateTime> {
    let (rem, (_, day, _, month, _, year, _, (h, m, s), _, offset, _)) = tuple((
        dquote,
        date_day_fixed,
        char('-'),
        date_month,
        char('-'),
        date_year,
        sp,
        time,
        sp,
        zone,
        dquote,
    ))(input)?;

    let bad = || {
        nom::Err::Failure(ImapParseError {
            input,
            kind: ImapErrorKind::DateTime,
        })
    };

    let tz = FixedOffset::east_opt(offset).ok_or_else(bad)?;
    match tz.with_ymd_and_hms(year as i32, month, day, h, m, s) {
        LocalResult::Single(dt) => Ok((rem, DateTime(dt))),
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_time() {
        let (rem, dt) = date_time(b"\"17-Jul-1996 02:44:25 -0700\" ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(dt.to_string(), "17-Jul-1996 02:44:25 -0700");
    }

    #[test]
    fn test_date_time_space_padded_day() {
        let (_, dt) = date_time(b"\" 1-Jan-2024 00:00:00 +0000\" ").unwrap();
        assert_eq!(dt.to_string(), " 1-Jan-2024 00:00:00 +0000");
    }

    #[test]
    fn test_date_time_rejects_nonsense() {
        assert!(date_time(b"\"32-Jan-2024 00:00:00 +0000\" ").is_err());
        assert!(date_time(b"\"01-Jan-2024 25:00:00 +0000\" ").is_err());
    }

    #[test]
    fn test_date() {
        let (_, d) = date(b"5-Nov-2020 ").unwrap();
        assert_eq!(d.to_string(), "5-Nov-2020");

        let (_, d) = date(b"\"5-Nov-2020\" ").unwrap();
        assert_eq!(d.to_string(), "5-Nov-2020");
    }

    #[test]
    fn test_round_trip() {
        let (_, dt) = date_time(b"\"17-Jul-1996 02:44:25 -0700\" ").unwrap();
        let encoded = format!("\"{}\"", dt);
        let (_, dt2) = date_time(format!("{} ", encoded).as_bytes()).unwrap();
        assert_eq!(dt, dt2);
    }
}
