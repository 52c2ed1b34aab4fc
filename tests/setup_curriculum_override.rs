mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn curriculum_and_defaults_overrides_drive_the_engine() {
    let workspace = temp_dir("rolloverd-setup-override");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // defaults come back flagged as defaults before anything is saved
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.get",
        json!({ "section": "curriculum" }),
    );
    assert_eq!(got["isDefault"].as_bool(), Some(true));

    // invalid curricula are rejected
    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "setup.set",
        json!({
            "section": "curriculum",
            "values": [{ "name": "Lower", "grades": ["G1", "G1"] }]
        }),
    );
    assert_eq!(e["code"].as_str(), Some("bad_params"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.set",
        json!({
            "section": "curriculum",
            "values": [
                { "name": "Lower", "grades": ["G1", "G2"] },
                { "name": "Upper", "grades": ["G3"] }
            ]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.set",
        json!({ "section": "defaults", "values": { "section": "Blue", "capacity": 24 } }),
    );

    let curriculum = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "rollover.curriculum",
        json!({}),
    );
    assert_eq!(curriculum["flattened"], json!(["G1", "G2", "G3"]));

    // the engine now resolves successors against the override and
    // provisions with the overridden section/capacity
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.create",
        json!({ "gradeLevel": "G2" }),
    );
    let class_id = class["classId"].as_str().expect("class id").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.enroll",
        json!({ "classId": class_id, "lastName": "Helmy", "firstName": "Ziad" }),
    );
    let student_id = student["studentId"].as_str().expect("student id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "grades.record",
        json!({
            "classId": class_id, "studentId": student_id, "subject": "Math",
            "homework": 30, "quiz": 20, "midterm": 20, "final": 20
        }),
    );

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "rollover.preview",
        json!({ "classIds": [class_id], "threshold": 50 }),
    );
    assert_eq!(preview["items"][0]["nextGrade"].as_str(), Some("G3"));

    let _ = request_ok(&mut stdin, &mut reader, "c1", "rollover.commit", json!({}));
    let classes = request_ok(&mut stdin, &mut reader, "cl1", "classes.list", json!({}));
    let target = classes["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .find(|c| c["gradeLevel"].as_str() == Some("G3"))
        .expect("provisioned G3 class")
        .clone();
    assert_eq!(target["name"].as_str(), Some("G3 (Blue)"));
    assert_eq!(target["section"].as_str(), Some("Blue"));
    assert_eq!(target["capacity"].as_i64(), Some(24));
    // no teachers in this workspace: homeroom stays unassigned
    assert!(target["homeroomTeacherId"].is_null());
}
