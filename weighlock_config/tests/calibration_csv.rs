use std::fs::File;
use std::io::Write;

use rstest::rstest;
use tempfile::tempdir;
use weighlock_config::{CalibrationRow, ScaleCalibration, load_calibration_csv};

fn row(weight: f64, raw: i64) -> CalibrationRow {
    CalibrationRow { weight, raw }
}

#[rstest]
fn two_point_fit_is_exact() {
    let c = ScaleCalibration::from_rows(&[row(0.0, 1000), row(100.0, 21_000)]).unwrap();
    assert!((c.scale_factor - 200.0).abs() < 1e-9);
    assert_eq!(c.zero_counts, 1000);
}

#[rstest]
fn ols_over_collinear_points() {
    let rows = [row(0.0, -500), row(50.0, 4500), row(100.0, 9500), row(200.0, 19_500)];
    let c = ScaleCalibration::from_rows(&rows).unwrap();
    assert!((c.scale_factor - 100.0).abs() < 1e-9);
    assert_eq!(c.zero_counts, -500);
}

#[rstest]
fn single_outlier_is_dropped_on_refit() {
    // raw = 10 * weight, except one wildly wrong reading
    let mut rows: Vec<CalibrationRow> = (0..10)
        .map(|i| row(f64::from(i) * 10.0, i64::from(i) * 100))
        .collect();
    rows[7].raw += 5_000;
    let c = ScaleCalibration::from_rows(&rows).unwrap();
    assert!((c.scale_factor - 10.0).abs() < 1e-6, "got {}", c.scale_factor);
    assert_eq!(c.zero_counts, 0);
}

#[rstest]
fn rejects_single_row() {
    let err = ScaleCalibration::from_rows(&[row(0.0, 1)]).expect_err("needs two rows");
    assert!(format!("{err}").contains("at least two rows"));
}

#[rstest]
fn rejects_duplicate_weights() {
    let err = ScaleCalibration::from_rows(&[row(5.0, 1), row(5.0, 2)]).expect_err("duplicate");
    assert!(format!("{err}").contains("duplicate weight"));
}

#[rstest]
fn rejects_flat_response() {
    let err = ScaleCalibration::from_rows(&[row(0.0, 7), row(10.0, 7)]).expect_err("flat");
    assert!(format!("{err}").contains("unusable scale factor"));
}

#[rstest]
fn loads_csv_with_exact_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "weight,raw").unwrap();
    writeln!(f, "0.0, 50682624").unwrap();
    writeln!(f, "1.0, 56578279").unwrap();
    drop(f);

    let c = load_calibration_csv(&path).unwrap();
    assert!((c.scale_factor - 5_895_655.0).abs() < 1e-3);
    assert_eq!(c.zero_counts, 50_682_624);
}

#[rstest]
#[case("raw,weight")]
#[case("grams,raw")]
fn csv_with_wrong_headers_is_rejected(#[case] header: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    std::fs::write(&path, format!("{header}\n0,1\n1,2\n")).unwrap();
    let err = load_calibration_csv(&path).expect_err("headers");
    assert!(format!("{err}").contains("must have headers 'weight,raw'"));
}

#[rstest]
fn csv_with_bad_row_reports_line() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    std::fs::write(&path, "weight,raw\n0,1\nheavy,2\n").unwrap();
    let err = load_calibration_csv(&path).expect_err("bad row");
    assert!(format!("{err}").contains("invalid CSV row 3"));
}
