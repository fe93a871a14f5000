//! Fixed assistant wording.

pub const CLARIFY: &str = "لم أجد إجابة مطابقة تماماً. هل تقصد أحد الأسئلة التالية؟";
pub const NO_ANSWER: &str = "عذراً، لا أملك إجابة لهذا السؤال حالياً.";
pub const SEARCH_FAILED: &str = "حدث خطأ أثناء البحث عن الإجابة. يرجى المحاولة مرة أخرى.";
pub const LOOKUP_MISS: &str = "عذراً، لم أتمكن من العثور على إجابة لهذا السؤال المقترح.";

pub fn welcome(name: &str) -> String {
    format!("أهلاً {name}! كيف يمكنني مساعدتك في التحضير لاختبارك اليوم؟")
}

pub fn name_too_short(min: usize) -> String {
    format!("يرجى إدخال اسم صحيح مكوّن من {min} أحرف على الأقل.")
}
