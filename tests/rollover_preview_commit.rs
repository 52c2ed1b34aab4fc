mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn preview_then_commit_moves_promoted_students_and_provisions_target() {
    let workspace = temp_dir("rolloverd-preview-commit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Mona Fathy" }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "gradeLevel": "First Primary" }),
    );
    let class_id = class["classId"].as_str().expect("class id").to_string();

    let mut student_ids = Vec::new();
    for (i, (last, first)) in [("Aziz", "Salma"), ("Badr", "Omar"), ("Chalabi", "Nour")]
        .iter()
        .enumerate()
    {
        let s = request_ok(
            &mut stdin,
            &mut reader,
            &format!("enroll-{}", i),
            "students.enroll",
            json!({ "classId": class_id, "lastName": last, "firstName": first }),
        );
        student_ids.push(s["studentId"].as_str().expect("student id").to_string());
    }

    // s0 passes (total 70), s1 fails (totals 70 and 20 -> mean 45),
    // s2 has no grades at all.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.record",
        json!({
            "classId": class_id, "studentId": student_ids[0], "subject": "Math",
            "homework": 10, "quiz": 10, "midterm": 20, "final": 30
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.record",
        json!({
            "classId": class_id, "studentId": student_ids[1], "subject": "Math",
            "homework": 20, "quiz": 10, "midterm": 20, "final": 20
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g3",
        "grades.record",
        json!({
            "classId": class_id, "studentId": student_ids[1], "subject": "Science",
            "homework": 5, "quiz": 5, "midterm": 5, "final": 5
        }),
    );

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "rollover.preview",
        json!({ "classIds": [class_id], "threshold": 50 }),
    );
    let items = preview["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item["classId"].as_str(), Some(class_id.as_str()));
    assert_eq!(item["nextGrade"].as_str(), Some("Second Primary"));
    assert_eq!(
        item["promoteIds"],
        json!([student_ids[0]]),
        "only the passing student promotes: {}",
        item
    );
    let mut expected_repeat = vec![student_ids[1].clone(), student_ids[2].clone()];
    expected_repeat.sort();
    assert_eq!(item["repeatIds"], json!(expected_repeat));
    assert_eq!(item["graduateIds"], json!([]));
    // no Second Primary class exists yet and preview must not create one
    assert!(item["targetClassId"].is_null());
    let classes = request_ok(&mut stdin, &mut reader, "cl1", "classes.list", json!({}));
    assert_eq!(classes["classes"].as_array().expect("classes").len(), 1);

    let commit = request_ok(&mut stdin, &mut reader, "c1", "rollover.commit", json!({}));
    assert_eq!(commit["succeeded"], json!([class_id]));
    assert!(commit.get("failedAt").is_none(), "commit failed: {}", commit);

    // target class was provisioned with defaults and the homeroom policy
    let classes = request_ok(&mut stdin, &mut reader, "cl2", "classes.list", json!({}));
    let all = classes["classes"].as_array().expect("classes");
    assert_eq!(all.len(), 2);
    let target = all
        .iter()
        .find(|c| c["gradeLevel"].as_str() == Some("Second Primary"))
        .expect("provisioned target class");
    assert_eq!(target["name"].as_str(), Some("Second Primary (A)"));
    assert_eq!(target["section"].as_str(), Some("A"));
    assert_eq!(target["capacity"].as_i64(), Some(30));
    assert!(target["homeroomTeacherId"].is_string());

    // promoted student moved, repeaters stayed
    let target_id = target["id"].as_str().expect("target id");
    let target_roster = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "classes.roster",
        json!({ "classId": target_id }),
    );
    assert_eq!(target_roster["studentIds"], json!([student_ids[0]]));
    let source_roster = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "classes.roster",
        json!({ "classId": class_id }),
    );
    assert_eq!(source_roster["studentIds"], json!(expected_repeat));

    // the run landed in the audit trail
    let runs = request_ok(&mut stdin, &mut reader, "a1", "rollover.runs", json!({}));
    let runs = runs["runs"].as_array().expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["threshold"].as_f64(), Some(50.0));
    assert_eq!(runs[0]["succeeded"], json!([class_id]));
    assert!(runs[0]["failedAt"].is_null());
}
