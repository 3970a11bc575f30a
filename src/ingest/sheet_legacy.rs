// The fixed-layout row written for submissions that predate versioned
// payloads.

use crate::ingest::*;

pub const LEGACY_SHEET: &str = "Responses.csv";

/// Section key, column prefix and number of positional answers per
/// direction, in column order.
const LAYOUT: [(&str, &str, usize); 7] = [
    ("mainCategories", "Main", 5),
    ("economic", "Econ", 3),
    ("environmental", "Env", 3),
    ("technological", "Tech", 3),
    ("operational", "Oper", 3),
    ("social", "Soc", 3),
    ("policy", "Pol", 3),
];

const RESPONDENT_HEADERS: [&str; 13] = [
    "Timestamp",
    "Response ID",
    "Name",
    "Email",
    "Organization",
    "Occupation",
    "Industry",
    "Experience",
    "Education",
    "Country",
    "Expertise",
    "Start Time",
    "End Time",
];

fn section_headers(prefix: &str, slots: usize) -> Vec<String> {
    // The last answer of each direction compares the two extremes.
    let mut res = vec![format!("{}_Most", prefix), format!("{}_Least", prefix)];
    for i in 1..slots {
        res.push(format!("{}_MostVsOther{}", prefix, i));
    }
    res.push(format!("{}_MostVsLeast", prefix));
    for i in 1..slots {
        res.push(format!("{}_Other{}VsLeast", prefix, i));
    }
    res.push(format!("{}_MostVsLeast2", prefix));
    res
}

pub fn headers() -> Vec<String> {
    let mut res: Vec<String> = RESPONDENT_HEADERS.iter().map(|s| s.to_string()).collect();
    for (_, prefix, slots) in LAYOUT.iter() {
        res.append(&mut section_headers(prefix, *slots));
    }
    res
}

pub fn build_row(payload: &LegacyPayload, response_id: &str, timestamp: &str) -> Vec<String> {
    let r = payload.respondent();
    let mut row = vec![
        timestamp.to_string(),
        response_id.to_string(),
        r.name.clone().unwrap_or_default(),
        r.email.clone().unwrap_or_default(),
        r.organization.clone().unwrap_or_default(),
        r.occupation.clone(),
        r.industry.clone(),
        r.experience.clone(),
        r.education.clone(),
        r.country.clone(),
        r.expertise.clone(),
        r.start_time.clone(),
        r.end_time.clone(),
    ];
    for (key, _, slots) in LAYOUT.iter() {
        row.push(payload.field(key, "most").to_string());
        row.push(payload.field(key, "least").to_string());
        for direction in [Direction::MostVsOther, Direction::OtherVsLeast] {
            for i in 0..*slots {
                let name = format!("{}{}", direction.legacy_prefix(), i);
                row.push(payload.field(key, &name).to_string());
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layout() {
        let h = headers();
        assert_eq!(h.len(), 73);
        assert_eq!(h[13], "Main_Most");
        assert_eq!(h[19], "Main_MostVsLeast");
        assert_eq!(h[24], "Main_MostVsLeast2");
        assert_eq!(h[25], "Econ_Most");
        assert_eq!(h[29], "Econ_MostVsLeast");
        assert_eq!(h[72], "Pol_MostVsLeast2");
    }

    #[test]
    fn row_of_a_legacy_submission() {
        let js = json!({
            "respondent": {"name": "Ada", "occupation": "Engineer", "endTime": "t1"},
            "responses": {
                "mainCategories": {"most": "Economic", "least": "Policy",
                                   "comp_most_0": "Slightly more", "comp_least_4": "Extremely more"},
                "policy": {"most": "Weak enforcement", "comp_least_2": "Moderately more"}
            }
        });
        let p = match IncomingPayload::detect(js) {
            Some(IncomingPayload::Legacy(p)) => p,
            other => panic!("unexpected {:?}", other),
        };
        let row = build_row(&p, "rid", "now");
        assert_eq!(row.len(), headers().len());
        assert_eq!(row[1], "rid");
        assert_eq!(row[2], "Ada");
        assert_eq!(row[3], "");
        assert_eq!(row[5], "Engineer");
        assert_eq!(row[12], "t1");
        assert_eq!(row[13], "Economic");
        assert_eq!(row[14], "Policy");
        assert_eq!(row[15], "Slightly more");
        assert_eq!(row[24], "Extremely more");
        assert_eq!(row[65], "Weak enforcement");
        assert_eq!(row[72], "Moderately more");
    }
}
