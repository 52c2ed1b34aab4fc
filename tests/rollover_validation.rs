mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn rollover_and_seed_methods_reject_bad_inputs() {
    let workspace = temp_dir("rolloverd-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // everything except health requires a workspace
    let e = request_err(
        &mut stdin,
        &mut reader,
        "0",
        "rollover.preview",
        json!({ "classIds": ["x"], "threshold": 50 }),
    );
    assert_eq!(e["code"].as_str(), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "gradeLevel": "KG 1" }),
    );
    let class_id = class["classId"].as_str().expect("class id").to_string();

    // gradeLevel outside the curriculum order
    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "gradeLevel": "Grade 13" }),
    );
    assert_eq!(e["code"].as_str(), Some("bad_params"));

    // threshold out of range, missing, and non-numeric
    for (id, params) in [
        ("t1", json!({ "classIds": [class_id], "threshold": 101 })),
        ("t2", json!({ "classIds": [class_id], "threshold": -1 })),
        ("t3", json!({ "classIds": [class_id] })),
        ("t4", json!({ "classIds": [class_id], "threshold": "fifty" })),
    ] {
        let e = request_err(&mut stdin, &mut reader, id, "rollover.preview", params);
        assert_eq!(e["code"].as_str(), Some("bad_params"), "params id {}", id);
    }

    // class list must be present and non-empty
    let e = request_err(
        &mut stdin,
        &mut reader,
        "t5",
        "rollover.preview",
        json!({ "classIds": [], "threshold": 50 }),
    );
    assert_eq!(e["code"].as_str(), Some("bad_params"));

    // an unknown class id fails the whole preview, no partial result
    let e = request_err(
        &mut stdin,
        &mut reader,
        "t6",
        "rollover.preview",
        json!({ "classIds": [class_id, "missing-class"], "threshold": 50 }),
    );
    assert_eq!(e["code"].as_str(), Some("preview_failed"));
    let e = request_err(&mut stdin, &mut reader, "t7", "rollover.commit", json!({}));
    assert_eq!(e["code"].as_str(), Some("no_preview"));

    // grades for a student who is not on the class roster
    let e = request_err(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.record",
        json!({
            "classId": class_id, "studentId": "nobody", "subject": "Math",
            "homework": 10
        }),
    );
    assert_eq!(e["code"].as_str(), Some("not_found"));

    // negative grade components are rejected
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "students.enroll",
        json!({ "classId": class_id, "lastName": "Gaber", "firstName": "Hana" }),
    );
    let student_id = student["studentId"].as_str().expect("student id");
    let e = request_err(
        &mut stdin,
        &mut reader,
        "g3",
        "grades.record",
        json!({
            "classId": class_id, "studentId": student_id, "subject": "Math",
            "homework": -5
        }),
    );
    assert_eq!(e["code"].as_str(), Some("bad_params"));

    // unknown method still answers
    let e = request_err(&mut stdin, &mut reader, "z1", "rollover.undo", json!({}));
    assert_eq!(e["code"].as_str(), Some("not_implemented"));
}
