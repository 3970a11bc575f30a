/*!

This is the long-form manual for `pairwise_survey` and `pwsurvey`.

## Survey definition

A survey is defined by a JSON document:

```json
{
  "schemaVersion": 2,
  "surveyId": "bw_online_survey",
  "surveyVersion": "2026-02",
  "scaleOptions": [
    { "id": "slightly_more", "label": "Slightly more challenging", "helpText": "minor difference in impact" },
    { "id": "extremely_more", "label": "Extremely more challenging" }
  ],
  "sections": [
    {
      "key": "economic",
      "title": "Economic Barriers",
      "kind": "sub",
      "items": [
        { "id": "high_infrastructure_cost", "label": "High infrastructure cost", "description": "..." },
        { "id": "high_financial_risk", "label": "High financial risk" }
      ]
    }
  ]
}
```

Section keys are unique, item ids are unique within their section, scale ids
are unique. Every section has at least one item and there is at least one
scale option. Labels may collide after trimming and case folding: lookups by
label then resolve to the first declaration, and the collision is logged.

## Pages

Page 0 is the introduction, page 1 the demographics, then one page per
section in declared order. A section page is complete when both extremes are
chosen and differ, the comparisons are open, and every comparison has an
answer. The demographics are complete when `occupation`, `industry`,
`experience`, `education` and `country` are filled in.

## Comparisons

With `n` items, choosing the most challenging item `m` and the least
challenging item `l` yields `n - 1` "most vs other" questions (every item but
`m`) and `n - 2` "other vs least" questions (every item but `m` and `l`), in
declared order. They are numbered from 3, questions 1 and 2 being the
extremes.

Unlocking the extremes and confirming a new pair discards the answers that
depend on what changed:

| changed       | discarded                                   |
|---------------|---------------------------------------------|
| both          | all answers                                 |
| most only     | `comparisonsMostVsOther`, `othersForMost`   |
| least only    | `comparisonsOtherVsLeast`, `othersForLeast` |
| none          | nothing                                     |

## Submission (`v2`)

```json
{
  "schemaVersion": 2, "surveyId": "...", "surveyVersion": "...",
  "submittedAt": "2026-02-01T10:00:00.000Z",
  "respondent": { "occupation": "...", "industry": "...", "experience": "...",
                  "education": "...", "country": "...", "expertise": "...",
                  "startTime": "...", "endTime": "..." },
  "responses": {
    "economic": {
      "mostItemId": "...", "leastItemId": "...",
      "comparisonsMostVsOther": { "<item id>": "<scale id>" },
      "comparisonsOtherVsLeast": { "<item id>": "<scale id>" },
      "othersForMost": ["..."], "othersForLeast": ["..."]
    }
  },
  "schemaSnapshot": { "...": "the definition, without descriptions and help texts" },
  "clientMeta": { "userAgent": "...", "timezone": "...", "pageUrl": "..." }
}
```

A submission is checked against its own `schemaSnapshot`, never against the
current definition.

## Legacy submissions

Submissions without a numeric `schemaVersion` of at least 2 (or without an
object `responses`) follow the fixed layout used before: the sections
`mainCategories`, `economic`, `environmental`, `technological`,
`operational`, `social` and `policy`, each with `most`, `least` and the
positional answers `comp_most_<i>` and `comp_least_<i>`.

## Saved progress

The progress is saved under `survey_progress_v2` (older versions used
`survey_progress`). It holds the responses in the submission shape plus
`respondentInfo`, `currentPage` and `timestamp`. On load, the answers are
mapped onto the current definition by id, then by label. What cannot be
mapped is dropped with a warning.

A section that was unlocked for editing when the progress was saved is listed
in `editBaselines` with the pair it had before the unlock:

```json
{ "editBaselines": { "economic": { "mostItemId": "econ_1", "leastItemId": "econ_4" } } }
```

It comes back unlocked, and its next confirmation discards the answers that
depend on a changed selection.

## `pwsurvey`

```text
pwsurvey --input payload.json --out sheets/
pwsurvey --mode validate --input payload.json
pwsurvey --mode normalize --input progress.json --schema survey.json
```

In `ingest` mode, the payload is appended to CSV files in the output
directory: `Responses_Meta.csv`, `Responses_Sections.csv` and
`Responses_Comparisons.csv` for `v2` payloads, `Responses.csv` for legacy
ones. The response id is the SHA-256 of the payload. Ingesting the same
payload twice appends nothing the second time.

*/
