use serde_json::{json, Value};

use crate::commands::session::Role;

/// Returns the matchup prompt sent to Gemini.
pub fn strategy_prompt(role: Role, my_champion: &str, opponent: &str, context: Option<&str>) -> String {
    let reference = match context {
        Some(ctx) => format!("特定参考：{ctx}。\n"),
        None => String::new(),
    };
    format!(
        "分析英雄联盟对局：{role}位，我方【{my_champion}】对阵敌方【{opponent}】。\n\
         {reference}\
         要求：给出极简、硬核、可直接执行的对线或开野指令，分前期、中期、后期。\n\
         只输出符合给定结构的 JSON。"
    )
}

/// Returns the fixed response schema for strategy answers.
pub fn strategy_response_schema() -> Value {
    let string_list = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "earlyGame": string_list,
            "midGame": string_list,
            "lateGame": string_list,
            "matchupTips": { "type": "STRING" },
            "recommendedCreator": { "type": "STRING" }
        },
        "required": [
            "summary",
            "earlyGame",
            "midGame",
            "lateGame",
            "matchupTips",
            "recommendedCreator"
        ]
    })
}
