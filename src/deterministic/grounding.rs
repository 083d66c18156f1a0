//! Entity grounding checker.
//!
//! Extracts clinical entities from the note with regex patterns and checks
//! each one against the transcript. Matching is normalized substring
//! comparison with a curated synonym dictionary covering abbreviations,
//! lay-to-clinical mappings, and procedure names. Entities in the note that
//! cannot be grounded are candidates for the judge to investigate.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::EntityGrounding;

/// Terms that never need transcript grounding. Two categories: generic
/// non-clinical words, and O/A/P terms that are the clinician's own
/// findings and plan items rather than patient-reported facts.
static STOP_ENTITIES: &[&str] = &[
    // Generic non-clinical
    "patient", "patients", "doctor", "physician", "history", "daily",
    "twice", "once", "today", "week", "weeks", "month", "months",
    "year", "years", "day", "days", "time", "times", "follow-up",
    "follow up", "visit", "exam", "examination", "review", "noted",
    "reports", "reports taking", "denies", "presents", "states", "complains",
    "left", "right", "bilateral", "mild", "moderate", "severe",
    "acute", "chronic", "stable", "normal", "abnormal",
    "symptoms", "symptom", "treatment", "diagnosis", "condition",
    "medical", "clinical", "significant", "unremarkable",
    // Physical exam findings
    "erythematous", "exudates", "tenderness", "swollen", "distended",
    "clear", "intact", "supple", "afebrile", "oriented", "alert",
    "nontender", "non-tender", "soft", "regular", "irregular",
    "diminished", "auscultation", "palpation", "percussion",
    "murmur", "rales", "rhonchi", "wheezing",
    "oropharynx", "oropharynx erythematous", "tympanic",
    "conjunctiva", "sclera", "mucosa", "pharynx",
    "lungs clear", "lungs clear bilaterally", "bowel sounds",
    "no acute distress", "well-appearing", "well appearing",
    "grossly normal", "within normal limits", "wnl",
    "sensation", "sensation intact", "no ulcers", "ulcers",
    "foot exam", "foot examination", "skin exam",
    "well-nourished", "well nourished", "well-developed",
    "cooperative", "comfortable", "distress",
    "obese", "obesity", "overweight",
    // Plan items
    "diabetic eye exam", "eye exam", "recheck", "recheck a1c",
    "screening", "preventive", "counseling", "education",
    "continue", "discontinue", "taper", "titrate", "adjust",
    "prn", "as needed", "bid", "tid", "qid", "qd", "qhs",
    "bmi", "bmi over 30", "bmi over 25",
    // Clinical assessments
    "well-controlled", "well controlled", "poorly controlled",
    "uncontrolled", "viral", "bacterial", "benign", "malignant",
    "idiopathic", "etiology", "differential", "prognosis",
    "exacerbation", "remission", "recurrence", "progression",
    // Plan orders
    "supportive care", "conservative management", "return",
    "referral", "workup", "monitoring",
    "rest", "fluids", "ice", "elevation", "reassurance",
    "worsening", "improvement",
    "reassess", "reevaluate",
];

static STOP_SET: LazyLock<BTreeSet<&'static str>> =
    LazyLock::new(|| STOP_ENTITIES.iter().copied().collect());

/// Abbreviations, lay terms, and procedure names mapped to their clinical
/// equivalents, with a precompiled whole-word pattern per key. Table order
/// is fixed so synonym expansion, and the evidence quote it selects, is the
/// same on every run. A UMLS-backed linker would subsume this; the
/// dictionary is transparent and the judge layer catches what it misses.
static MEDICAL_SYNONYMS: LazyLock<Vec<(Regex, &'static [&'static str])>> =
    LazyLock::new(|| {
        let entries: &[(&'static str, &'static [&'static str])] = &[
            // Abbreviations
            ("htn", &["hypertension", "high blood pressure", "elevated blood pressure"]),
            ("hypertension", &["htn", "high blood pressure", "blood pressure"]),
            ("dm", &["diabetes mellitus", "diabetes", "diabetic"]),
            ("dm2", &["type 2 diabetes", "t2dm", "type ii diabetes"]),
            ("t2dm", &["type 2 diabetes", "dm2", "type ii diabetes", "diabetes mellitus type 2"]),
            ("type 2 diabetes mellitus", &["diabetes", "diabetic", "dm", "dm2", "t2dm", "type 2 diabetes"]),
            ("diabetes mellitus", &["diabetes", "diabetic", "dm", "sugar diabetes"]),
            ("diabetes", &["diabetes mellitus", "dm", "diabetic"]),
            ("chf", &["congestive heart failure", "heart failure"]),
            ("heart failure", &["chf", "congestive heart failure"]),
            ("copd", &["chronic obstructive pulmonary disease"]),
            ("chronic obstructive pulmonary disease", &["copd"]),
            ("mi", &["myocardial infarction", "heart attack"]),
            ("myocardial infarction", &["mi", "heart attack"]),
            ("cva", &["cerebrovascular accident", "stroke"]),
            ("stroke", &["cva", "cerebrovascular accident"]),
            ("afib", &["atrial fibrillation", "a fib", "a-fib"]),
            ("atrial fibrillation", &["afib", "a fib", "a-fib"]),
            ("ckd", &["chronic kidney disease", "renal disease"]),
            ("chronic kidney disease", &["ckd"]),
            ("gerd", &["gastroesophageal reflux", "acid reflux", "reflux disease"]),
            ("cad", &["coronary artery disease", "coronary disease"]),
            ("coronary artery disease", &["cad"]),
            ("dvt", &["deep vein thrombosis", "deep venous thrombosis"]),
            ("pe", &["pulmonary embolism"]),
            ("pulmonary embolism", &["pe"]),
            ("sob", &["shortness of breath", "dyspnea"]),
            ("shortness of breath", &["sob", "dyspnea"]),
            ("dyspnea", &["shortness of breath", "sob"]),
            ("uri", &["upper respiratory infection"]),
            ("uti", &["urinary tract infection"]),
            ("bph", &["benign prostatic hyperplasia", "enlarged prostate"]),
            ("osa", &["obstructive sleep apnea", "sleep apnea"]),
            ("r/o", &["rule out", "ruled out"]),
            ("hx", &["history"]),
            ("fx", &["fracture"]),
            ("sx", &["symptoms"]),
            ("dx", &["diagnosis"]),
            ("tx", &["treatment"]),
            ("rx", &["prescription", "medication"]),
            ("nkda", &["no known drug allergies"]),
            ("nsaid", &["nonsteroidal anti inflammatory", "anti inflammatory"]),
            ("ace inhibitor", &["angiotensin converting enzyme inhibitor"]),
            ("arb", &["angiotensin receptor blocker"]),
            ("ppi", &["proton pump inhibitor"]),
            ("ssri", &["selective serotonin reuptake inhibitor"]),
            ("bp", &["blood pressure"]),
            ("hr", &["heart rate"]),
            ("rr", &["respiratory rate"]),
            ("wbc", &["white blood cell", "white count"]),
            ("rbc", &["red blood cell"]),
            ("hgb", &["hemoglobin"]),
            ("plt", &["platelet", "platelets"]),
            ("bun", &["blood urea nitrogen"]),
            ("cr", &["creatinine"]),
            ("egfr", &["estimated glomerular filtration rate", "gfr"]),
            ("ast", &["aspartate aminotransferase"]),
            ("alt", &["alanine aminotransferase"]),
            ("inr", &["international normalized ratio"]),
            ("tsh", &["thyroid stimulating hormone"]),
            ("a1c", &["hemoglobin a1c", "hba1c", "glycated hemoglobin"]),
            ("hba1c", &["a1c", "hemoglobin a1c"]),
            ("bnp", &["brain natriuretic peptide", "b type natriuretic peptide"]),
            ("ekg", &["electrocardiogram", "ecg"]),
            ("ecg", &["electrocardiogram", "ekg"]),
            // Lay term to clinical term
            ("high cholesterol", &["hyperlipidemia", "dyslipidemia", "elevated cholesterol"]),
            ("hyperlipidemia", &["high cholesterol", "dyslipidemia"]),
            ("high blood sugar", &["hyperglycemia", "elevated glucose"]),
            ("hyperglycemia", &["high blood sugar", "elevated glucose"]),
            ("low blood sugar", &["hypoglycemia"]),
            ("hypoglycemia", &["low blood sugar"]),
            ("high blood pressure", &["hypertension", "htn", "elevated blood pressure"]),
            ("low blood pressure", &["hypotension"]),
            ("hypotension", &["low blood pressure"]),
            ("kidney disease", &["renal disease", "nephropathy", "ckd", "chronic kidney disease"]),
            ("nephropathy", &["kidney disease", "renal disease"]),
            ("liver disease", &["hepatic disease", "hepatopathy"]),
            ("fatty liver", &["hepatic steatosis", "nafld", "steatosis"]),
            ("hepatic steatosis", &["fatty liver", "nafld"]),
            ("blood clot", &["thrombosis", "thrombus", "embolism", "dvt", "pe"]),
            ("thrombosis", &["blood clot", "thrombus"]),
            ("heart attack", &["myocardial infarction", "mi", "cardiac event"]),
            ("mini stroke", &["transient ischemic attack", "tia"]),
            ("tia", &["transient ischemic attack", "mini stroke"]),
            ("transient ischemic attack", &["tia", "mini stroke"]),
            ("irregular heartbeat", &["arrhythmia", "atrial fibrillation", "afib"]),
            ("arrhythmia", &["irregular heartbeat", "irregular rhythm"]),
            ("seizure", &["epilepsy", "convulsion", "seizure disorder"]),
            ("epilepsy", &["seizure disorder", "seizures"]),
            ("asthma", &["reactive airway disease", "bronchospasm"]),
            ("reactive airway disease", &["asthma"]),
            ("pneumonia", &["lung infection", "pulmonary infection"]),
            ("bronchitis", &["chest cold", "airway inflammation"]),
            ("pharyngitis", &["sore throat", "throat pain", "throat infection"]),
            ("sore throat", &["pharyngitis", "throat pain"]),
            ("acute pharyngitis", &["sore throat", "throat pain", "throat infection"]),
            ("sinusitis", &["sinus infection", "sinus congestion", "sinus pressure"]),
            ("sinus infection", &["sinusitis"]),
            ("otitis media", &["ear infection", "middle ear infection"]),
            ("ear infection", &["otitis media", "otitis"]),
            ("cellulitis", &["skin infection", "infected skin"]),
            ("conjunctivitis", &["pink eye", "eye infection"]),
            ("gastroenteritis", &["stomach flu", "stomach bug", "stomach virus"]),
            ("urticaria", &["hives"]),
            ("hives", &["urticaria"]),
            ("contusion", &["bruise", "bruising"]),
            ("laceration", &["cut", "wound"]),
            ("sprain", &["twisted", "strain"]),
            ("anemia", &["low blood count", "low hemoglobin", "low iron"]),
            ("low blood count", &["anemia"]),
            ("thyroid problem", &["thyroid disorder", "hypothyroidism", "hyperthyroidism"]),
            ("hypothyroidism", &["underactive thyroid", "low thyroid"]),
            ("hyperthyroidism", &["overactive thyroid", "high thyroid"]),
            ("arthritis", &["osteoarthritis", "degenerative joint disease", "oa", "joint disease"]),
            ("osteoarthritis", &["arthritis", "degenerative joint disease", "oa"]),
            ("degenerative joint disease", &["osteoarthritis", "arthritis", "oa"]),
            ("gout", &["gouty arthritis", "hyperuricemia"]),
            ("anxiety", &["anxiety disorder", "generalized anxiety", "gad"]),
            ("gad", &["generalized anxiety disorder", "anxiety"]),
            ("depression", &["major depressive disorder", "mdd", "depressive disorder"]),
            ("mdd", &["major depressive disorder", "depression"]),
            ("obesity", &["obese", "morbid obesity", "bmi over 30"]),
            ("overweight", &["elevated bmi", "bmi over 25"]),
            // Symptoms
            ("stomach ache", &["abdominal pain", "epigastric pain", "gastric pain"]),
            ("abdominal pain", &["stomach ache", "belly pain", "stomach pain"]),
            ("heartburn", &["acid reflux", "gerd", "gastroesophageal reflux", "dyspepsia"]),
            ("dyspepsia", &["indigestion", "heartburn", "upset stomach"]),
            ("indigestion", &["dyspepsia", "heartburn"]),
            ("chest pain", &["angina", "chest discomfort", "substernal pain"]),
            ("angina", &["chest pain", "anginal pain"]),
            ("headache", &["cephalgia", "head pain", "migraine"]),
            ("cephalgia", &["headache", "head pain"]),
            ("migraine", &["headache", "migraine headache"]),
            ("dizziness", &["vertigo", "lightheadedness", "lightheaded"]),
            ("vertigo", &["dizziness", "room spinning"]),
            ("nausea", &["nauseous", "queasy", "upset stomach"]),
            ("swelling", &["edema", "oedema", "swollen"]),
            ("edema", &["swelling", "swollen", "fluid retention"]),
            ("numbness", &["paresthesia", "tingling", "neuropathy"]),
            ("paresthesia", &["numbness", "tingling", "pins and needles"]),
            ("neuropathy", &["nerve damage", "nerve pain", "numbness and tingling"]),
            ("rash", &["dermatitis", "skin eruption", "skin rash"]),
            ("dermatitis", &["rash", "skin inflammation"]),
            ("itching", &["pruritus", "itchy"]),
            ("pruritus", &["itching", "itchy", "itch"]),
            ("fatigue", &["tiredness", "tired", "exhaustion", "malaise"]),
            ("malaise", &["fatigue", "feeling unwell", "general weakness"]),
            ("constipation", &["difficulty with bowel movements", "hard stools"]),
            ("diarrhea", &["loose stools", "watery stools", "frequent bowel movements"]),
            ("painful urination", &["dysuria", "burning urination"]),
            ("dysuria", &["painful urination", "burning urination", "burning with urination"]),
            ("frequent urination", &["urinary frequency", "polyuria"]),
            ("polyuria", &["frequent urination", "excessive urination"]),
            ("joint pain", &["arthralgia", "joint ache"]),
            ("arthralgia", &["joint pain"]),
            ("muscle pain", &["myalgia", "muscle ache", "muscle soreness"]),
            ("myalgia", &["muscle pain", "muscle ache"]),
            ("back pain", &["lumbago", "lumbar pain", "dorsalgia"]),
            ("lumbago", &["back pain", "lower back pain", "lumbar pain"]),
            // Procedures
            ("knee replacement", &["total knee arthroplasty", "tka", "knee arthroplasty"]),
            ("total knee arthroplasty", &["knee replacement", "tka"]),
            ("tka", &["total knee arthroplasty", "knee replacement"]),
            ("hip replacement", &["total hip arthroplasty", "tha", "hip arthroplasty"]),
            ("total hip arthroplasty", &["hip replacement", "tha"]),
            ("tha", &["total hip arthroplasty", "hip replacement"]),
            ("appendix out", &["appendectomy", "appendix removed"]),
            ("appendectomy", &["appendix removed", "appendix out"]),
            ("gallbladder out", &["cholecystectomy", "gallbladder removed"]),
            ("cholecystectomy", &["gallbladder removed", "gallbladder out"]),
            ("colonoscopy", &["colon scope", "colon screening"]),
            ("endoscopy", &["upper endoscopy", "egd", "scope"]),
            ("egd", &["esophagogastroduodenoscopy", "upper endoscopy", "upper scope"]),
            ("cabg", &["coronary artery bypass graft", "bypass surgery", "heart bypass"]),
            ("bypass surgery", &["cabg", "coronary artery bypass"]),
            ("stent", &["stent placement", "coronary stent", "pci"]),
            ("pci", &["percutaneous coronary intervention", "stent", "angioplasty"]),
            ("angioplasty", &["pci", "balloon angioplasty", "stent placement"]),
            ("c section", &["cesarean section", "cesarean delivery", "c-section"]),
            ("cesarean section", &["c section", "c-section", "cesarean"]),
            ("hysterectomy", &["uterus removed", "uterus removal"]),
            // Medication classes
            ("blood thinner", &["anticoagulant", "anticoagulation", "warfarin", "coumadin", "eliquis", "xarelto"]),
            ("anticoagulant", &["blood thinner", "anticoagulation"]),
            ("pain killer", &["analgesic", "pain medication", "pain reliever"]),
            ("analgesic", &["pain killer", "pain medication"]),
            ("water pill", &["diuretic", "fluid pill"]),
            ("diuretic", &["water pill", "fluid pill"]),
            ("steroid", &["corticosteroid", "prednisone", "glucocorticoid"]),
            ("corticosteroid", &["steroid", "glucocorticoid"]),
            ("insulin", &["insulin injection", "insulin therapy"]),
            ("statin", &["cholesterol medication", "cholesterol medicine", "lipid lowering"]),
            ("beta blocker", &["beta-blocker", "metoprolol", "atenolol", "carvedilol"]),
            ("calcium channel blocker", &["ccb", "amlodipine", "nifedipine"]),
            ("ccb", &["calcium channel blocker"]),
        ];
        entries
            .iter()
            .map(|(key, synonyms)| {
                let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(key))).unwrap();
                (pattern, *synonyms)
            })
            .collect()
    });

static MED_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:[\w-]+\s+){0,2}(?:prescribed|taking|started?|administer|continued?|medication|dose)(?:\s+[\w-]+){0,4}",
    )
    .unwrap()
});

static DRUG_DOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Za-z][\w-]+\s+\d+\s*(?:mg|mcg|ml|units?|g)\b").unwrap()
});

static VITAL_SIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:blood\s+pressure|BP|heart\s+rate|HR|temperature|temp|respiratory\s+rate|RR|SpO2|O2\s+sat|BMI|weight|height)\s*[:=]?\s*[\d./]+(?:\s*(?:mmHg|bpm|°?[CF]|%|kg|lbs?|cm|in))?",
    )
    .unwrap()
});

static LAB_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:A1C|hemoglobin|hgb|WBC|RBC|platelet|creatinine|BUN|glucose|cholesterol|LDL|HDL|triglyceride|TSH|sodium|potassium|GFR|eGFR|ALT|AST|INR|albumin)\s*(?:of|:|\s|=)?\s*[\d.]+(?:\s*(?:mg/dL|mmol/L|%|g/dL|mEq/L|U/L))?",
    )
    .unwrap()
});

static DIAGNOSIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:diagnosed?\s+with|assessment|impression|history\s+of)\s+([\w\s,'-]+?)(?:\.|,\s*(?:and|with|secondary)|$)",
    )
    .unwrap()
});

static TRAILING_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s:=]*[\d./%]+.*$").unwrap());

static PURE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\d./%]+$").unwrap());

fn is_stop_entity(entity: &str) -> bool {
    if STOP_SET.contains(entity) {
        return true;
    }
    // "bmi 31.2" has base term "bmi" which is a stop word
    let base = TRAILING_VALUE.replace(entity, "");
    let base = base.trim();
    !base.is_empty() && base != entity && STOP_SET.contains(base)
}

/// Extract clinical entities worth grounding. Collected into a sorted set so
/// output order is stable across runs.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities: BTreeSet<String> = BTreeSet::new();

    for m in MED_CONTEXT.find_iter(text) {
        let phrase = m.as_str().trim();
        if phrase.len() > 8 {
            entities.insert(phrase.to_lowercase());
        }
    }
    for m in DRUG_DOSE.find_iter(text) {
        entities.insert(m.as_str().trim().to_lowercase());
    }
    for m in VITAL_SIGN.find_iter(text) {
        entities.insert(m.as_str().trim().to_lowercase());
    }
    for m in LAB_VALUE.find_iter(text) {
        entities.insert(m.as_str().trim().to_lowercase());
    }
    for caps in DIAGNOSIS.captures_iter(text) {
        let dx = caps[1].trim().to_lowercase();
        if dx.len() > 5 && dx.len() < 100 {
            entities.insert(dx);
        }
    }

    entities
        .into_iter()
        .filter(|e| !PURE_NUMBER.is_match(e))
        .filter(|e| e.len() > 2)
        .filter(|e| !is_stop_entity(e))
        .collect()
}

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lower, " ");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

fn expand_with_synonyms(normalized: &str) -> Vec<String> {
    let mut expansions = vec![normalized.to_string()];
    for (pattern, synonyms) in MEDICAL_SYNONYMS.iter() {
        if pattern.is_match(normalized) {
            expansions.extend(synonyms.iter().map(|s| s.to_string()));
        }
    }
    expansions
}

/// Slice `text` around `[idx, idx + len)` with a context window on each
/// side, snapping to char boundaries.
fn evidence_window(text: &str, idx: usize, len: usize) -> String {
    let mut start = idx.saturating_sub(40);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (idx + len + 40).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    format!("...{}...", text[start..end].trim())
}

const KEY_TERM_STOPWORDS: &[&str] = &["the", "and", "for", "with", "was", "are", "has", "had", "not"];

/// Check whether one entity can be grounded in the transcript. Returns the
/// match result and, when a direct or synonym match is found, an evidence
/// quote from the transcript.
pub fn check_entity(entity: &str, norm_transcript: &str) -> (bool, Option<String>) {
    let norm_entity = normalize(entity);

    if let Some(idx) = norm_transcript.find(&norm_entity) {
        return (
            true,
            Some(evidence_window(norm_transcript, idx, norm_entity.len())),
        );
    }

    for synonym in expand_with_synonyms(&norm_entity) {
        let norm_syn = normalize(&synonym);
        if norm_syn.is_empty() {
            continue;
        }
        if let Some(idx) = norm_transcript.find(&norm_syn) {
            let quote = evidence_window(norm_transcript, idx, norm_syn.len());
            return (true, Some(format!("{quote} (synonym: {synonym})")));
        }
    }

    // Partial match on key terms handles spacing and phrasing variants like
    // "metformin 500mg" vs "metformin 500 mg" or "a1c of 6.8" vs "a1c was 6.8".
    let key_terms: Vec<&str> = norm_entity
        .split_whitespace()
        .filter(|t| t.len() > 2 && !KEY_TERM_STOPWORDS.contains(t))
        .collect();
    if !key_terms.is_empty() {
        let matches = key_terms
            .iter()
            .filter(|t| norm_transcript.contains(*t))
            .count();
        if matches as f64 >= key_terms.len() as f64 * 0.6 {
            return (true, None);
        }
    }

    (false, None)
}

/// Extract entities from the note and ground each against the transcript.
/// Returns the per-entity results and the grounding rate. No entities means
/// a vacuous rate of 1.0.
pub fn check_grounding(note: &str, transcript: &str) -> (Vec<EntityGrounding>, f64) {
    let entities = extract_entities(note);
    if entities.is_empty() {
        return (Vec::new(), 1.0);
    }

    let norm_transcript = normalize(transcript);
    let results: Vec<EntityGrounding> = entities
        .into_iter()
        .map(|entity| {
            let (found, evidence) = check_entity(&entity, &norm_transcript);
            EntityGrounding {
                entity,
                found_in_transcript: found,
                transcript_evidence: evidence,
            }
        })
        .collect();

    let grounded = results.iter().filter(|r| r.found_in_transcript).count();
    let rate = grounded as f64 / results.len() as f64;
    (results, rate)
}
