use chrono::{DateTime, SecondsFormat, Utc};

/// Sortable, filesystem-safe stamp used to name spool entries
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use mailsubmit::time::spool_stamp;
/// let received = Utc.with_ymd_and_hms(2021, 12, 1, 12, 1, 3).unwrap();
///
/// assert_eq!(
///     spool_stamp(&received),
///     "20211201T120103.000Z",
///     "A spool stamp wasn't formatted properly"
/// );
/// ```
pub fn spool_stamp(received: &DateTime<Utc>) -> String {
    received.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

/// RFC 3339 with millisecond precision, for the envelope metadata.
pub fn rfc3339(received: &DateTime<Utc>) -> String {
    received.to_rfc3339_opts(SecondsFormat::Millis, true)
}
