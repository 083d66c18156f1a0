//! Meta-evaluation: testing the evaluator itself.
//!
//! Synthetic notes with deliberately injected errors are run through the
//! full pipeline. If the pipeline misses a planted fabrication, the
//! evaluator has a blind spot. Three clean controls measure the false-alarm
//! side, and the two rates are reported separately (sensitivity and
//! specificity) because a judge that flags everything would look perfect on
//! recall alone.
//!
//! Repeated runs of the same judge are deliberately not compared against
//! each other. At temperature 0 that comparison is trivially deterministic
//! and above it, it measures sampling noise, not judgment quality.

use tracing::info;

use crate::models::{EvalReport, GateDecision, MetaEvalResult, NoteInput, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedFinding {
    Hallucination,
    Omission,
    Clean,
}

/// A synthetic transcript/note pair with a known planted defect (or none).
pub struct SyntheticCase {
    pub name: &'static str,
    pub transcript: &'static str,
    pub soap_note: &'static str,
    pub expected: ExpectedFinding,
    /// Text the finding must quote for the case to count as detected.
    pub expected_text: &'static str,
    pub description: &'static str,
}

impl SyntheticCase {
    pub fn to_note_input(&self) -> NoteInput {
        NoteInput {
            note_id: format!("meta-{}", self.name),
            transcript: self.transcript.to_string(),
            soap_note: self.soap_note.to_string(),
            reference_note: None,
        }
    }
}

/// The injected-error corpus: 6 hallucination cases, 6 omission cases, and
/// 3 clean controls.
pub const CASES: &[SyntheticCase] = &[
    SyntheticCase {
        name: "fabricated_medication",
        transcript: "Doctor: What medications are you currently taking? Patient: I take lisinopril 10mg daily for my blood pressure. Doctor: Any other medications? Patient: No, that's it.",
        soap_note: "S: Patient reports taking lisinopril 10mg daily and metformin 500mg twice daily for blood pressure management.\nO: Vitals stable.\nA: Hypertension, well-controlled.\nP: Continue current medications.",
        expected: ExpectedFinding::Hallucination,
        expected_text: "metformin",
        description: "Note fabricates metformin - patient only takes lisinopril",
    },
    SyntheticCase {
        name: "negation_reversal",
        transcript: "Doctor: Any chest pain? Patient: No, no chest pain at all. Doctor: Shortness of breath? Patient: No, I feel fine breathing-wise.",
        soap_note: "S: Patient reports chest pain and shortness of breath.\nO: Vitals within normal limits.\nA: Chest pain, etiology to be determined.\nP: Order EKG and chest X-ray.",
        expected: ExpectedFinding::Hallucination,
        expected_text: "chest pain",
        description: "Note says patient reports chest pain, but patient explicitly denied it",
    },
    SyntheticCase {
        name: "missing_critical_allergy",
        transcript: "Doctor: Any allergies? Patient: Yes, I'm severely allergic to penicillin. I had anaphylaxis last time. Doctor: That's important, we'll make sure to note that.",
        soap_note: "S: Patient presents for routine follow-up.\nO: Vitals stable. No acute distress.\nA: Routine health maintenance.\nP: Schedule follow-up in 6 months.",
        expected: ExpectedFinding::Omission,
        expected_text: "penicillin",
        description: "Critical penicillin allergy with anaphylaxis history completely omitted",
    },
    SyntheticCase {
        name: "wrong_dosage",
        transcript: "Doctor: What dose of metoprolol are you on? Patient: 25 milligrams twice a day. Doctor: And that's been working well? Patient: Yes, my heart rate has been good.",
        soap_note: "S: Patient taking metoprolol 250mg twice daily with good heart rate control.\nO: HR 72, regular.\nA: Rate-controlled atrial fibrillation.\nP: Continue current regimen.",
        expected: ExpectedFinding::Hallucination,
        expected_text: "250mg",
        description: "Note says 250mg but transcript says 25mg - 10x dosage error",
    },
    SyntheticCase {
        name: "fabricated_family_history",
        transcript: "Doctor: Any family history of heart disease? Patient: No, my parents are both healthy. Doctor: Good to hear.",
        soap_note: "S: Patient reports family history of coronary artery disease in father, who had MI at age 55.\nO: Normal exam.\nA: Low cardiovascular risk.\nP: Continue preventive measures.",
        expected: ExpectedFinding::Hallucination,
        expected_text: "family history of coronary artery disease",
        description: "Fabricated family history - patient said parents are healthy",
    },
    SyntheticCase {
        name: "temporal_distortion",
        transcript: "Doctor: When did the symptoms start? Patient: About two weeks ago. Doctor: And they've been getting better? Patient: Yes, much better now, almost gone.",
        soap_note: "S: Patient reports acute onset of symptoms 2 days ago, progressively worsening.\nO: Appears uncomfortable.\nA: Acute illness, worsening.\nP: Urgent workup needed.",
        expected: ExpectedFinding::Hallucination,
        expected_text: "2 days ago",
        description: "Note says 2 days (acute, worsening) but transcript says 2 weeks (improving)",
    },
    SyntheticCase {
        name: "omitted_symptom",
        transcript: "Doctor: Tell me about your symptoms. Patient: I've had this terrible headache for 3 days, and I noticed some vision changes too - like blurry vision in my left eye. Doctor: Any nausea? Patient: Yes, quite a bit.",
        soap_note: "S: Patient reports 3-day history of headache with nausea.\nO: Neuro exam grossly normal.\nA: Tension headache.\nP: OTC analgesics, return if worsening.",
        expected: ExpectedFinding::Omission,
        expected_text: "vision changes",
        description: "Blurry vision in left eye is clinically significant and omitted",
    },
    SyntheticCase {
        name: "correct_note",
        transcript: "Doctor: What brings you in today? Patient: I've had a sore throat for about 3 days now. It's been getting worse. Doctor: Any fever? Patient: Yes, I've had a low-grade fever, around 100. I checked it this morning. Doctor: Any cough or runny nose? Patient: A little bit of a runny nose but no cough. Doctor: Any difficulty swallowing? Patient: It hurts to swallow but I can still eat and drink. Doctor: Have you been around anyone who's been sick? Patient: My daughter had strep last week actually. Doctor: Okay, let me take a look. Open wide for me. I can see your throat is red but I don't see any white patches or exudates. Your tonsils are a bit swollen. Let me feel your neck - you have some tender lymph nodes on both sides. Doctor: I'm going to do a rapid strep test. Let me also check your vitals. Your temperature is 100.1, heart rate 82, blood pressure 118 over 74. Patient: Do you think it's strep? Doctor: We'll see what the test shows. The rapid strep came back negative. Given the viral symptoms with the runny nose and the negative strep test, this is most likely viral pharyngitis. Patient: What should I do for it? Doctor: Rest, plenty of fluids, you can take ibuprofen or acetaminophen for the pain and fever. Warm salt water gargles can help too. If it gets worse or doesn't improve in about 5 to 7 days, come back and we'll reevaluate.",
        soap_note: "S: Patient presents with 3-day history of sore throat, progressively worsening. Associated low-grade fever (100F reported at home), mild rhinorrhea, and odynophagia. No cough. Reports sick contact - daughter diagnosed with strep throat last week. Patient is able to tolerate oral intake.\nO: Temp 100.1F, HR 82, BP 118/74. Oropharynx erythematous without exudates. Tonsils mildly enlarged bilaterally. Bilateral tender anterior cervical lymphadenopathy. Rapid strep antigen test negative.\nA: Acute viral pharyngitis. Negative rapid strep with viral features (rhinorrhea, absence of exudates) supports viral etiology. Sick contact with strep-positive individual noted but clinical presentation and testing favor viral cause.\nP: Supportive care with rest, increased fluid intake, and analgesics (ibuprofen or acetaminophen) for pain and fever management. Salt water gargles as needed. Return if symptoms worsen or fail to improve within 5-7 days for reevaluation and possible throat culture.",
        expected: ExpectedFinding::Clean,
        expected_text: "",
        description: "Accurate pharyngitis note with full exam and workup - should NOT flag hallucinations",
    },
    SyntheticCase {
        name: "correct_note_diabetes",
        transcript: "Doctor: Good to see you again. How's your blood sugar been since our last visit? Patient: It's been a lot better since I started the metformin. I've been checking it every morning and it's usually between 110 and 130 fasting. Doctor: That's great improvement. What dose are you on? Patient: 500mg twice a day, with breakfast and dinner. Doctor: And your last A1C was 7.2, which was down from 8.1. Any side effects from the medication? Patient: I had some stomach upset at first, maybe the first two weeks, but it went away after that. Doctor: Good. Are you still following the diet plan we discussed? Patient: Yes, I've been cutting back on carbs and trying to walk 30 minutes most days. Doctor: Excellent. Let me check your vitals. Blood pressure is 124 over 78, heart rate 76, weight is 198 pounds, down from 205 last visit. That's good progress. Let me check your feet - sensation is intact, no lesions, pulses are good. Patient: When should I get my A1C checked again? Doctor: Let's recheck it in 3 months. I want to make sure we're still trending in the right direction. Keep up the good work with the diet and exercise.",
        soap_note: "S: Follow-up for type 2 diabetes mellitus. Patient reports improved glycemic control on metformin 500mg BID (with meals). Home fasting glucose readings 110-130 mg/dL. Initial GI side effects (first 2 weeks) have resolved. Patient adhering to dietary modifications (carbohydrate reduction) and exercise program (walking 30 minutes daily). Previous A1C 8.1, most recent 7.2.\nO: BP 124/78, HR 76, Weight 198 lbs (down from 205 at last visit, 7 lb loss). Diabetic foot exam: sensation intact to monofilament bilaterally, no skin breakdown or lesions noted, dorsalis pedis and posterior tibial pulses palpable bilaterally.\nA: Type 2 diabetes mellitus, improving on current regimen. A1C trending down (8.1 to 7.2) with combined pharmacotherapy and lifestyle modifications. Weight loss of 7 lbs consistent with dietary and exercise changes.\nP: Continue metformin 500mg BID with meals. Continue current diet and exercise program. Recheck A1C in 3 months to assess continued progress. Routine diabetic foot exam performed today, no concerns. Return visit in 3 months.",
        expected: ExpectedFinding::Clean,
        expected_text: "",
        description: "Accurate diabetes follow-up with exam findings and labs - should NOT flag hallucinations",
    },
    SyntheticCase {
        name: "correct_note_hypertension",
        transcript: "Doctor: How's the blood pressure medication been working for you? Patient: Good, I've been taking the lisinopril 10mg every morning like you said. Doctor: Any side effects? Any dizziness or cough? Patient: No, no problems at all. I feel fine. Doctor: Have you been checking your blood pressure at home? Patient: Yes, it's usually around 125 to 130 on top and 80 to 85 on the bottom. Doctor: That's well controlled. Let me get your vitals today. Blood pressure is 128 over 82, heart rate 72, respiratory rate 16. Weight is 182. Let me listen to your heart and lungs. Heart sounds regular, no murmurs. Lungs are clear. Any swelling in your legs or ankles? Patient: No, nothing like that. Doctor: Are you still limiting your salt intake? Patient: Yes, I've been cooking at home more and reading labels. Doctor: Good. Any chest pain, shortness of breath, or headaches? Patient: No, none of that. Doctor: Everything looks good. We'll continue the lisinopril at the same dose. Let's get some routine labs - a basic metabolic panel to check your kidney function and potassium since you're on an ACE inhibitor, and a lipid panel. Follow up in 6 months unless any issues come up.",
        soap_note: "S: Follow-up for essential hypertension. Patient reports good tolerance of lisinopril 10mg daily. Denies dizziness, cough, chest pain, shortness of breath, headaches, or lower extremity edema. Home blood pressure readings averaging 125-130/80-85 mmHg. Patient adhering to low-sodium diet with home cooking and label reading.\nO: BP 128/82, HR 72, RR 16, Weight 182 lbs. Cardiovascular exam: regular rate and rhythm, no murmurs, rubs, or gallops. Lungs clear to auscultation bilaterally. No peripheral edema.\nA: Essential hypertension, well-controlled on current medication. Home and office readings at goal. No evidence of end-organ damage or medication side effects. ACE inhibitor well tolerated without cough.\nP: Continue lisinopril 10mg daily. Order basic metabolic panel (monitor renal function and potassium on ACE inhibitor) and fasting lipid panel. Reinforce dietary sodium restriction. Follow-up in 6 months. Return sooner if blood pressure elevations, new symptoms, or medication side effects develop.",
        expected: ExpectedFinding::Clean,
        expected_text: "",
        description: "Accurate hypertension follow-up with full vitals and exam - should NOT flag hallucinations",
    },
    SyntheticCase {
        name: "contextual_distortion",
        transcript: "Doctor: How's your diabetes management? Patient: My A1C was 6.8 last month, so my doctor was happy with that. Doctor: Great, that's well-controlled.",
        soap_note: "S: Patient reports poorly controlled diabetes with A1C of 6.8.\nO: No acute findings.\nA: Uncontrolled type 2 diabetes.\nP: Increase metformin dose.",
        expected: ExpectedFinding::Hallucination,
        expected_text: "poorly controlled",
        description: "A1C 6.8 is well-controlled - note distorts this as 'poorly controlled'",
    },
    SyntheticCase {
        name: "omitted_surgical_history",
        transcript: "Doctor: Any prior surgeries? Patient: I had my appendix out when I was 15, and a knee replacement on my right side about 5 years ago. Doctor: How's the knee doing? Patient: Great, no issues.",
        soap_note: "S: Patient reports history of appendectomy in adolescence.\nO: Well-appearing, no acute distress.\nA: Routine follow-up.\nP: Continue annual visits.",
        expected: ExpectedFinding::Omission,
        expected_text: "knee replacement",
        description: "Right knee replacement is significant surgical history, omitted from note",
    },
    SyntheticCase {
        name: "omitted_current_medication",
        transcript: "Doctor: What medications are you taking? Patient: I'm on warfarin for my afib, and I take amlodipine for blood pressure, and omeprazole for my stomach. Doctor: What dose of warfarin? Patient: 5mg daily, and my INR was 2.3 last week.",
        soap_note: "S: Patient with atrial fibrillation on warfarin 5mg daily, INR 2.3. Also takes amlodipine for hypertension.\nO: Vitals stable.\nA: Afib, well-anticoagulated.\nP: Continue warfarin, recheck INR in 4 weeks.",
        expected: ExpectedFinding::Omission,
        expected_text: "omeprazole",
        description: "Omeprazole omitted from medication list - important for drug interactions with warfarin",
    },
    SyntheticCase {
        name: "omitted_social_history",
        transcript: "Doctor: Do you smoke? Patient: I quit about 6 months ago, but I smoked a pack a day for 20 years. Doctor: That's a 20 pack-year history. Good that you quit. Any alcohol? Patient: No, I stopped drinking 2 years ago. I was drinking heavily before that.",
        soap_note: "S: Former smoker, quit 6 months ago, 20 pack-year history.\nO: Lungs clear bilaterally.\nA: Tobacco use disorder in remission.\nP: Continue smoking cessation support.",
        expected: ExpectedFinding::Omission,
        expected_text: "drinking",
        description: "Prior heavy alcohol use omitted - relevant for liver function, medication choices, and screening",
    },
    SyntheticCase {
        name: "omitted_red_flag_symptom",
        transcript: "Doctor: Tell me about your back pain. Patient: It started about a week ago, just lower back. Doctor: Any numbness or tingling? Patient: Yes, I've noticed tingling going down my left leg. Doctor: Any trouble with bladder or bowel control? Patient: Actually yes, I've had some difficulty urinating the last couple days.",
        soap_note: "S: Patient reports 1-week history of lower back pain with left leg tingling.\nO: Positive straight leg raise on left. Sensation intact.\nA: Lumbar radiculopathy.\nP: Physical therapy referral, NSAIDs.",
        expected: ExpectedFinding::Omission,
        expected_text: "difficulty urinating",
        description: "Urinary retention with back pain is a red flag for cauda equina syndrome - critical omission",
    },
];

/// Whether a case's planted defect (or clean control) was handled correctly.
///
/// An error case counts as detected only when a finding of the expected kind
/// quotes the planted text in its cited quote or explanation. A clean control
/// passes when no critical or major hallucination is reported and the gate
/// did not FAIL. An unavailable judgment handles neither.
pub fn case_detected(case: &SyntheticCase, report: &EvalReport) -> bool {
    let Some(judgment) = report.judgment.as_available() else {
        return false;
    };

    match case.expected {
        ExpectedFinding::Clean => {
            let false_alarms = judgment
                .hallucinations
                .iter()
                .filter(|h| matches!(h.severity, Severity::Critical | Severity::Major))
                .count();
            false_alarms == 0 && report.quality_gate.decision != GateDecision::FAIL
        }
        ExpectedFinding::Hallucination => {
            let expected = case.expected_text.to_lowercase();
            judgment.hallucinations.iter().any(|h| {
                h.note_text.to_lowercase().contains(&expected)
                    || h.explanation.to_lowercase().contains(&expected)
            })
        }
        ExpectedFinding::Omission => {
            let expected = case.expected_text.to_lowercase();
            judgment.omissions.iter().any(|o| {
                o.transcript_text.to_lowercase().contains(&expected)
                    || o.explanation.to_lowercase().contains(&expected)
            })
        }
    }
}

/// Run every synthetic case through the supplied evaluator and score the
/// evaluator's detection performance.
pub fn run_meta_evaluation<F>(mut evaluate: F) -> MetaEvalResult
where
    F: FnMut(&NoteInput) -> EvalReport,
{
    let mut details = Vec::with_capacity(CASES.len());
    let mut error_cases = 0usize;
    let mut errors_detected = 0usize;
    let mut clean_cases = 0usize;
    let mut clean_passed = 0usize;

    for case in CASES {
        let input = case.to_note_input();
        let report = evaluate(&input);
        let ok = case_detected(case, &report);

        match case.expected {
            ExpectedFinding::Clean => {
                clean_cases += 1;
                if ok {
                    clean_passed += 1;
                    details.push(format!(
                        "PASS [{}]: Correctly identified clean note (no false alarms)",
                        case.name
                    ));
                } else {
                    details.push(format!(
                        "FAIL [{}]: False alarm on clean note - {}",
                        case.name, case.description
                    ));
                }
            }
            ExpectedFinding::Hallucination | ExpectedFinding::Omission => {
                let kind = if case.expected == ExpectedFinding::Hallucination {
                    "hallucination"
                } else {
                    "omission"
                };
                error_cases += 1;
                if ok {
                    errors_detected += 1;
                    details.push(format!(
                        "PASS [{}]: Detected {kind} - {}",
                        case.name, case.description
                    ));
                } else {
                    details.push(format!(
                        "FAIL [{}]: Missed {kind} - {}",
                        case.name, case.description
                    ));
                }
            }
        }
    }

    let sensitivity = if error_cases > 0 {
        errors_detected as f64 / error_cases as f64
    } else {
        0.0
    };
    let specificity = if clean_cases > 0 {
        clean_passed as f64 / clean_cases as f64
    } else {
        0.0
    };

    info!(
        sensitivity,
        specificity, errors_detected, error_cases, clean_passed, clean_cases,
        "meta-evaluation complete"
    );

    MetaEvalResult {
        total_cases: CASES.len(),
        error_cases,
        errors_detected,
        clean_cases,
        clean_passed,
        sensitivity,
        specificity,
        details,
    }
}
