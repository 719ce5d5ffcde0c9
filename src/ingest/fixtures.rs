/// Test fixtures: representative JSON payloads from each upstream.
///
/// Structurally complete but truncated to the minimum needed to exercise
/// the parsers.
///
/// BOM KiWIS `getTimeseriesValues` (format=json):
///   [ { ts_id, ts_unitsymbol, rows, columns: "Timestamp,Value,Quality Code",
///       data: [ [ "<rfc3339>", <number|null>, <quality> ], ... ] } ]
///   Quality 255 means no data.
///
/// WMIP Hydstra `get_ts_traces` (version 2):
///   { error_num, return: { traces: [ { site, varto_details: { units },
///       trace: [ { v: "<string>", t: <YYYYMMDDHHmmss>, q: <quality> } ] } ] } }
///   `t` is AEST local time; `v` is a string; quality 255 means no data.
///
/// Open-Meteo `/v1/forecast`:
///   { utc_offset_seconds, current: { time, temperature_2m, ... },
///     hourly: { time: [...], precipitation: [...] } }
///   Times are local to `utc_offset_seconds`.

/// Bremer River at Walloon level, 15-minute cadence. The 11:15 row carries
/// quality 255 and the 11:30 row a null value; both must be ignored.
pub(crate) fn kiwis_level_json() -> &'static str {
    r#"[
      {
        "ts_id": "208669010",
        "ts_unitsymbol": "m",
        "rows": "7",
        "columns": "Timestamp,Value,Quality Code",
        "data": [
          ["2024-05-01T10:00:00.000+10:00", 4.812, 10],
          ["2024-05-01T10:15:00.000+10:00", 4.861, 10],
          ["2024-05-01T10:30:00.000+10:00", 4.905, 10],
          ["2024-05-01T10:45:00.000+10:00", 4.957, 10],
          ["2024-05-01T11:00:00.000+10:00", 5.012, 10],
          ["2024-05-01T11:15:00.000+10:00", 0.0, 255],
          ["2024-05-01T11:30:00.000+10:00", null, 10]
        ]
      }
    ]"#
}

/// Hourly rainfall totals (mm).
pub(crate) fn kiwis_rainfall_json() -> &'static str {
    r#"[
      {
        "ts_id": "208670010",
        "rows": "3",
        "columns": "Timestamp,Value,Quality Code",
        "data": [
          ["2024-05-01T09:00:00.000+10:00", 1.2, 10],
          ["2024-05-01T10:00:00.000+10:00", 3.4, 10],
          ["2024-05-01T11:00:00.000+10:00", 0.6, 10]
        ]
      }
    ]"#
}

/// Savages Crossing level from a series stored in centimetres.
pub(crate) fn kiwis_level_cm_json() -> &'static str {
    r#"[
      {
        "ts_id": "208701010",
        "ts_unitsymbol": "cm",
        "rows": "2",
        "columns": "Timestamp,Value,Quality Code",
        "data": [
          ["2024-05-01T10:45:00.000+10:00", 450, 10],
          ["2024-05-01T11:00:00.000+10:00", 462, 10]
        ]
      }
    ]"#
}

/// A series whose unit symbol the service does not recognise.
pub(crate) fn kiwis_unknown_unit_json() -> &'static str {
    r#"[
      {
        "ts_id": "208702010",
        "ts_unitsymbol": "furlong",
        "rows": "1",
        "columns": "Timestamp,Value,Quality Code",
        "data": [["2024-05-01T11:00:00.000+10:00", 0.02, 10]]
      }
    ]"#
}

/// Empty time series: the gauge exists but reported nothing in the window.
pub(crate) fn kiwis_empty_json() -> &'static str {
    r#"[{ "ts_id": "208669010", "rows": "0", "columns": "Timestamp,Value,Quality Code", "data": [] }]"#
}

/// KiWIS error envelope (returned with HTTP 200).
pub(crate) fn kiwis_error_json() -> &'static str {
    r#"{ "type": "error", "code": "InvalidParameterValue", "message": "No matching timeseries found for ts_path" }"#
}

/// Wivenhoe storage (var 136, megalitres). `t` values are AEST.
pub(crate) fn hydstra_storage_json() -> &'static str {
    r#"{
      "error_num": 0,
      "return": {
        "traces": [
          {
            "error_num": 0,
            "site": "143035A",
            "site_details": { "name": "WIVENHOE DAM HEADWATER", "short_name": "WIVENHOE HW" },
            "varto_details": { "variable": "136.00", "units": "Megalitres", "name": "Storage Volume" },
            "trace": [
              { "v": "1165012.4", "t": 20240501090000, "q": 9 },
              { "v": "1165140.9", "t": 20240501100000, "q": 9 },
              { "v": "0", "t": 20240501110000, "q": 255 }
            ]
          }
        ]
      }
    }"#
}

/// Level (var 100) with string timestamps, as some Hydstra builds emit.
pub(crate) fn hydstra_level_json() -> &'static str {
    r#"{
      "error_num": 0,
      "return": {
        "traces": [
          {
            "error_num": 0,
            "site": "143107A",
            "varto_details": { "variable": "100.00", "units": "Metres", "name": "Stream Water Level" },
            "trace": [
              { "v": "4.50", "t": "20240501100000", "q": 9 },
              { "v": "4.75", "t": "20240501103000", "q": 9 },
              { "v": "5.00", "t": "20240501110000", "q": 9 }
            ]
          }
        ]
      }
    }"#
}

/// Hydstra-level error.
pub(crate) fn hydstra_error_json() -> &'static str {
    r#"{ "error_num": 126, "error_msg": "Site 999999X does not exist" }"#
}

/// Brisbane CBD current conditions and 30 hours of hourly precipitation
/// ending at 2024-05-01T12:00 local (AEST).
pub(crate) fn open_meteo_json() -> String {
    let mut times = Vec::new();
    let mut precipitation = Vec::new();
    // 2024-04-30T07:00 .. 2024-05-01T12:00 local
    for i in 0..30 {
        let hour = 7 + i;
        let (day, hour) = if hour < 24 { ("04-30", hour) } else { ("05-01", hour - 24) };
        times.push(format!("\"2024-{}T{:02}:00\"", day, hour));
        // first six hours fall outside the 24h window
        precipitation.push(if i < 6 { "5.0".to_string() } else { "0.5".to_string() });
    }
    // the last hour is still being accumulated
    precipitation[29] = "null".to_string();
    format!(
        r#"{{
          "latitude": -27.47,
          "longitude": 153.02,
          "utc_offset_seconds": 36000,
          "timezone": "Australia/Brisbane",
          "current_units": {{ "temperature_2m": "°C", "wind_speed_10m": "km/h", "surface_pressure": "hPa", "precipitation": "mm" }},
          "current": {{
            "time": "2024-05-01T12:00",
            "interval": 900,
            "temperature_2m": 23.46,
            "wind_speed_10m": 14.6,
            "surface_pressure": 1013.4,
            "precipitation": 0.04
          }},
          "hourly": {{
            "time": [{}],
            "precipitation": [{}]
          }}
        }}"#,
        times.join(","),
        precipitation.join(",")
    )
}
