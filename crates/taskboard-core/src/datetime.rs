use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;

use crate::config::Config;

/// Resolves "today" and due-date input in
/// the board's configured timezone, or the
/// machine's local zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardClock {
  tz: Option<Tz>
}

impl BoardClock {
  pub fn local() -> Self {
    Self { tz: None }
  }

  pub fn in_zone(tz: Tz) -> Self {
    Self { tz: Some(tz) }
  }

  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let raw = cfg
      .get("timezone")
      .unwrap_or_default();
    let tz = parse_timezone(&raw)?;
    if let Some(tz) = tz {
      tracing::debug!(timezone = %tz, "configured board timezone");
    }
    Ok(Self { tz })
  }

  pub fn timezone(&self) -> Option<Tz> {
    self.tz
  }

  #[must_use]
  pub fn date_of(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    match self.tz {
      | Some(tz) => {
        dt.with_timezone(&tz).date_naive()
      }
      | None => {
        dt.with_timezone(&Local).date_naive()
      }
    }
  }

  pub fn today(&self) -> NaiveDate {
    self.date_of(Utc::now())
  }

  /// Accepts `YYYY-MM-DD`, a full
  /// timestamp, `today`, `tomorrow`,
  /// `yesterday`, `+Nd`/`-Nd`/`+Nw` offsets
  /// and weekday names (next occurrence).
  #[tracing::instrument(skip(self, now), fields(input = input))]
  pub fn parse_due(
    &self,
    input: &str,
    now: DateTime<Utc>
  ) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    if token.is_empty() {
      return Err(anyhow!(
        "due date cannot be empty"
      ));
    }
    let lower = token.to_ascii_lowercase();
    let today = self.date_of(now);

    match lower.as_str() {
      | "today" => return Ok(today),
      | "tomorrow" => {
        return add_days(today, 1);
      }
      | "yesterday" => {
        return add_days(today, -1);
      }
      | _ => {}
    }

    if let Some(days) = parse_offset(&lower)?
    {
      return add_days(today, days);
    }

    if let Some(weekday) =
      parse_weekday_name(&lower)
    {
      return Ok(next_weekday_date(
        today, weekday
      ));
    }

    if let Ok(date) =
      NaiveDate::parse_from_str(token, "%Y-%m-%d")
    {
      return Ok(date);
    }

    if let Ok(dt) =
      DateTime::parse_from_rfc3339(token)
    {
      return Ok(
        self.date_of(dt.with_timezone(&Utc))
      );
    }

    for format in
      ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
    {
      if let Ok(naive) =
        NaiveDateTime::parse_from_str(
          token, format
        )
      {
        return Ok(naive.date());
      }
    }

    Err(anyhow!(
      "unrecognised due date '{token}': \
       expected YYYY-MM-DD, today, \
       tomorrow, +Nd or a weekday"
    ))
  }
}

/// `local` or an empty value selects the
/// machine zone.
pub fn parse_timezone(
  raw: &str
) -> anyhow::Result<Option<Tz>> {
  let trimmed = raw.trim();
  if trimmed.is_empty()
    || trimmed.eq_ignore_ascii_case("local")
  {
    return Ok(None);
  }
  trimmed
    .parse::<Tz>()
    .map(Some)
    .map_err(|err| {
      anyhow!(
        "invalid value for timezone: \
         '{trimmed}' ({err})"
      )
    })
}

fn parse_offset(
  lower: &str
) -> anyhow::Result<Option<i64>> {
  let (sign, rest) =
    if let Some(rest) = lower.strip_prefix('+')
    {
      (1, rest)
    } else if let Some(rest) =
      lower.strip_prefix('-')
    {
      (-1, rest)
    } else {
      return Ok(None);
    };

  let (digits, unit) =
    match rest.char_indices().last() {
      | Some((idx, 'd')) => (&rest[..idx], 1),
      | Some((idx, 'w')) => (&rest[..idx], 7),
      | _ => return Ok(None)
    };
  let count: i64 = digits
    .parse()
    .with_context(|| {
      format!("invalid offset '{lower}'")
    })?;
  Ok(Some(sign * count * unit))
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  date
    .checked_add_signed(Duration::days(days))
    .ok_or_else(|| {
      anyhow!(
        "date offset out of range: \
         {days} days"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token {
    | "monday" | "mon" => Some(Weekday::Mon),
    | "tuesday" | "tue" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" => Some(Weekday::Fri),
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => Some(Weekday::Sun),
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
