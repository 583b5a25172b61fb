/*!

This is the long-form manual for `trial_tally` and `trialtally`.

## Input format

The command line tool reads the result files of PCIbex experiments. They are
comma separated files in which every line starting with `#` is a comment.
The comment block introduced by `# Columns below this comment are as follows:`
names the columns:

```text
# Columns below this comment are as follows:
# 1. Results reception time.
# 2. MD5 hash of participant's IP address.
# 3. Controller name.
# 4. Order number of item.
# 5. Inner element number.
# 6. Label.
# 7. Latin.Square.Group.
# 8. PennElementType.
# 9. PennElementName.
# 10. Parameter.
# 11. Value.
# 12. EventTime.
# 13. Comments.
1700000000,8f1c,PennController,5,0,frases,NULL,PennController,5,_Trial_,Start,1700000001000,NULL
```

When the block is missing, the standard positions above are assumed. A file
lacking one of the participant, item, label, parameter, value or event time
columns is skipped and the missing columns are reported.

The events used are:

| Label    | Parameter                   | Value                  | Event            |
|----------|-----------------------------|------------------------|------------------|
| `frases` | `_Trial_`                   | `Start` / `End`        | trial boundaries |
| `frases` | `Selection`, `classificacao`| the chosen label       | classification   |
| `genero` | `Selected`                  | free text              | group answer     |

Rows whose item number or event time is not an integer are dropped.

## Matching

A classification belongs to the trial of the same participant and item, and
must happen between its `Start` and its `End`. When a participant classified
an item several times, the earliest classification is kept. A classification
that carries no item number is attached to the trial window that contains
it.

## Groups

The group answer is matched, ignoring case, against fragments: by default
`masculin` gives the group `m` and `feminin` the group `f`. Only the first
answer of a participant counts. Answers that match nothing are reported and
the participant does not vote.

## Majority and ties

The majority label of an item is the label with most votes. When the two
best labels have the same number of votes, the outcome is a tie, written
`empate` in the tables. An item nobody voted for has no majority and is not
a tie.

## Batches

Files are processed in lexicographic order. The item numbers of a file are
shifted by the largest item number of the file before it, so that items stay
unique in the concatenated tables. A file that cannot be read does not stop
the others.

## Output tables

| File                          | Content                                           |
|-------------------------------|---------------------------------------------------|
| `trials.csv`                  | one row per matched trial                         |
| `items_wide.csv`              | one row per item, one slot per selected participant |
| `aggregate_<group>.csv`       | majority and vote counts per item for a group     |
| `aggregate_<group>_no_ties.csv` | the same, restricted to the items kept          |
| `removed_ties.csv`            | the items tied in at least one group              |
| `double_ties.csv`             | the items tied in both groups                     |

## Configuration

All the settings can be given in a JSON file:

```json
{
  "inputSettings": {
    "directory": "logs_brutos",
    "filePattern": "results_prod*.csv",
    "itemNumberShift": 3,
    "excludedLabels": ["TCLE", "instrucoes", "agradecimento"]
  },
  "outputSettings": {
    "outputDirectory": "logs_em_tratamento",
    "delimiter": ","
  },
  "groups": [
    { "label": "m", "matches": ["masculin"] },
    { "label": "f", "matches": ["feminin"] }
  ],
  "rules": {
    "participantsPerGroup": 4,
    "decimalPlaces": 3,
    "labels": ["positiva", "negativa", "neutra"]
  }
}
```

Command line flags take precedence over the file.

*/
