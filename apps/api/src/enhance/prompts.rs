use crate::llm_client::prompts::JSON_ONLY_INSTRUCTION;

pub const RESUME_EXTRACTION_PROMPT_TEMPLATE: &str = r#"You are an expert resume parser.
Extract the structured data from the resume text below.

Return a JSON object with exactly this shape (use "" or [] for anything missing):
{
  "personalInfo": {
    "fullName": "", "email": "", "phone": "", "location": "",
    "linkedin": "", "website": ""
  },
  "summary": "",
  "experience": [
    {"company": "", "position": "", "location": "", "startDate": "", "endDate": "",
     "current": false, "description": ""}
  ],
  "education": [
    {"institution": "", "degree": "", "field": "", "startDate": "", "endDate": "", "gpa": ""}
  ],
  "skills": [""],
  "projects": [
    {"name": "", "description": "", "technologies": [""], "link": ""}
  ],
  "certifications": [
    {"name": "", "issuer": "", "date": ""}
  ]
}

Rules:
- Dates as they appear in the resume; do not invent dates.
- Do NOT infer or embellish anything that is not in the text.

{json_only}

Resume text:
"""
{resume_text}
""""#;

pub fn resume_extraction_prompt(resume_text: &str) -> String {
    RESUME_EXTRACTION_PROMPT_TEMPLATE
        .replace("{json_only}", JSON_ONLY_INSTRUCTION)
        .replace("{resume_text}", resume_text)
}
